use rocket::http::{ContentType, Status};

use crate::common::{connect_and_wait, test_client, unique_id};

#[test]
fn account_strength_is_zero_with_no_automation_history() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);

    let res = client.get(format!("/api/account-strength/{user_id}/{session_id}")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["score"], 0.0);
    assert_eq!(body["sent"], 0);
}

#[test]
fn account_strength_reflects_sent_automation_logs() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);

    client
        .post("/api/whatsapp/test-message")
        .header(ContentType::JSON)
        .body(format!(r#"{{"user_id":"{user_id}","session_id":"{session_id}","recipient":"201234567890","message":"hi"}}"#))
        .dispatch();

    let res = client.get(format!("/api/account-strength/{user_id}/{session_id}")).dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["sent"], 1);
    assert_eq!(body["score"], 100.0);
}

#[test]
fn strengthen_comprehensive_requires_an_active_session() {
    let client = test_client();
    let user_id = unique_id("user");
    let res = client.post(format!("/api/account-strength/{user_id}/never-connected/strengthen-comprehensive")).dispatch();
    assert_eq!(res.status(), Status::ServiceUnavailable);
}

#[test]
fn strengthen_comprehensive_bumps_last_activity_and_logs_a_strengthening_row() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);

    let before: serde_json::Value = client.get(format!("/api/whatsapp/session/{session_id}")).dispatch().into_json().unwrap();

    let res = client.post(format!("/api/account-strength/{user_id}/{session_id}/strengthen-comprehensive")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["strengthened"], true);

    let after: serde_json::Value = client.get(format!("/api/whatsapp/session/{session_id}")).dispatch().into_json().unwrap();
    assert!(after["last_activity"].as_str() >= before["last_activity"].as_str());

    let res = client.get(format!("/api/account-strength/{user_id}/{session_id}/logs")).dispatch();
    assert_eq!(res.status(), Status::Ok);
}
