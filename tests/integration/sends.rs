use rocket::http::{ContentType, Status};

use crate::common::{connect_and_wait, test_client, unique_id};

#[test]
fn happy_send_debits_wallet_and_logs_automation() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);

    let res = client
        .post("/api/whatsapp/test-message")
        .header(ContentType::JSON)
        .body(format!(r#"{{"user_id":"{user_id}","session_id":"{session_id}","recipient":"201234567890","message":"hello"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "sent");
    assert_eq!(body["balance_after"], 990);
    assert!(body["message_id"].as_str().is_some());

    let res = client.get(format!("/api/wallet/balance/{user_id}")).dispatch();
    let wallet: serde_json::Value = res.into_json().unwrap();
    assert_eq!(wallet["balance"], 990);

    let res = client.get(format!("/api/subscriptions/{user_id}")).dispatch();
    let sub: serde_json::Value = res.into_json().unwrap();
    assert_eq!(sub["messages_used"], 1);
}

#[test]
fn invalid_recipient_is_rejected_before_touching_the_wallet() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);

    let res = client
        .post("/api/whatsapp/test-message")
        .header(ContentType::JSON)
        .body(format!(r#"{{"user_id":"{user_id}","session_id":"{session_id}","recipient":"abc","message":"hi"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);

    let res = client.get(format!("/api/wallet/balance/{user_id}")).dispatch();
    let wallet: serde_json::Value = res.into_json().unwrap();
    assert_eq!(wallet["balance"], 1000);
}

#[test]
fn otp_send_defaults_to_arabic_and_debits_once() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);

    let res = client
        .post("/api/whatsapp/send-otp")
        .header(ContentType::JSON)
        .body(format!(r#"{{"user_id":"{user_id}","session_id":"{session_id}","recipient":"201234567890","code":"4821"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["balance_after"], 990);
}

#[test]
fn bulk_send_happy_path_debits_cost_times_recipient_count() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);

    let res = client
        .post("/api/whatsapp/send-announcement")
        .header(ContentType::JSON)
        .body(format!(
            r#"{{"user_id":"{user_id}","session_id":"{session_id}","recipients":["201111111111","201222222222","201333333333"],"message":"promo"}}"#
        ))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["sent"], 3);
    assert_eq!(body["failed"], 0);

    let res = client.get(format!("/api/wallet/balance/{user_id}")).dispatch();
    let wallet: serde_json::Value = res.into_json().unwrap();
    assert_eq!(wallet["balance"], 970);
}

#[test]
fn bulk_send_rejects_the_whole_batch_on_any_malformed_recipient_without_debiting() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);

    let res = client
        .post("/api/whatsapp/send-announcement")
        .header(ContentType::JSON)
        .body(format!(
            r#"{{"user_id":"{user_id}","session_id":"{session_id}","recipients":["201111111111","nope"],"message":"promo"}}"#
        ))
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);

    let res = client.get(format!("/api/wallet/balance/{user_id}")).dispatch();
    let wallet: serde_json::Value = res.into_json().unwrap();
    assert_eq!(wallet["balance"], 1000);
}

#[test]
fn send_after_disconnect_is_rejected_as_session_gone() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);
    client.post(format!("/api/whatsapp/disconnect/{session_id}")).dispatch();

    let res = client
        .post("/api/whatsapp/test-message")
        .header(ContentType::JSON)
        .body(format!(r#"{{"user_id":"{user_id}","session_id":"{session_id}","recipient":"201234567890","message":"hi"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);
}
