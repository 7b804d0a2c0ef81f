use std::time::{Duration, Instant};

use rocket::http::{ContentType, Status};

use crate::common::{test_client, unique_id};

#[test]
fn create_webhook_rejects_unknown_type_and_non_http_url() {
    let client = test_client();
    let user_id = unique_id("user");

    let res = client
        .post(format!("/api/webhooks/{user_id}"))
        .header(ContentType::JSON)
        .body(r#"{"session_id":"s1","webhook_type":"not_a_real_type","url":"http://example.com/hook"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);

    let res = client
        .post(format!("/api/webhooks/{user_id}"))
        .header(ContentType::JSON)
        .body(r#"{"session_id":"s1","webhook_type":"otp","url":"ftp://example.com/hook"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn create_webhook_round_trips_and_appears_in_the_list() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");

    let res = client
        .post(format!("/api/webhooks/{user_id}"))
        .header(ContentType::JSON)
        .body(format!(r#"{{"session_id":"{session_id}","webhook_type":"otp","url":"https://example.com/hook"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let webhook: serde_json::Value = res.into_json().unwrap();
    assert_eq!(webhook["webhook_type"], "otp");
    assert_eq!(webhook["is_active"], true);

    let res = client.get(format!("/api/webhooks/{user_id}")).dispatch();
    let list: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], webhook["id"]);
}

#[test]
fn duplicate_user_session_type_webhook_is_a_conflict() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");

    let body = format!(r#"{{"session_id":"{session_id}","webhook_type":"otp","url":"https://example.com/a"}}"#);
    let res = client.post(format!("/api/webhooks/{user_id}")).header(ContentType::JSON).body(body.clone()).dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.post(format!("/api/webhooks/{user_id}")).header(ContentType::JSON).body(body).dispatch();
    assert_eq!(res.status(), Status::Conflict);
}

#[test]
fn update_webhook_rejects_updates_for_a_webhook_owned_by_another_user() {
    let client = test_client();
    let owner = unique_id("user");
    let stranger = unique_id("user");
    let session_id = unique_id("session");

    let res = client
        .post(format!("/api/webhooks/{owner}"))
        .header(ContentType::JSON)
        .body(format!(r#"{{"session_id":"{session_id}","webhook_type":"otp","url":"https://example.com/a"}}"#))
        .dispatch();
    let webhook: serde_json::Value = res.into_json().unwrap();
    let webhook_id = webhook["id"].as_str().unwrap();

    let res = client
        .put(format!("/api/webhooks/{stranger}/{webhook_id}"))
        .header(ContentType::JSON)
        .body(r#"{"is_active":false}"#)
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);

    let res = client
        .put(format!("/api/webhooks/{owner}/{webhook_id}"))
        .header(ContentType::JSON)
        .body(r#"{"is_active":false}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let updated: serde_json::Value = res.into_json().unwrap();
    assert_eq!(updated["is_active"], false);
}

#[test]
fn delete_webhook_then_logs_and_deletes_are_not_found() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");

    let res = client
        .post(format!("/api/webhooks/{user_id}"))
        .header(ContentType::JSON)
        .body(format!(r#"{{"session_id":"{session_id}","webhook_type":"otp","url":"https://example.com/a"}}"#))
        .dispatch();
    let webhook: serde_json::Value = res.into_json().unwrap();
    let webhook_id = webhook["id"].as_str().unwrap();

    let res = client.delete(format!("/api/webhooks/{user_id}/{webhook_id}")).dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.delete(format!("/api/webhooks/{user_id}/{webhook_id}")).dispatch();
    assert_eq!(res.status(), Status::NotFound);

    let res = client.get(format!("/api/webhooks/{user_id}/{webhook_id}/logs")).dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn test_webhook_fires_a_synthetic_event_and_logs_the_failed_delivery() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");

    let res = client
        .post(format!("/api/webhooks/{user_id}"))
        .header(ContentType::JSON)
        .body(format!(
            r#"{{"session_id":"{session_id}","webhook_type":"otp","url":"http://127.0.0.1:1/hook","max_attempts":1,"retry_on_failure":false}}"#
        ))
        .dispatch();
    let webhook: serde_json::Value = res.into_json().unwrap();
    let webhook_id = webhook["id"].as_str().unwrap();

    let res = client.post(format!("/api/webhooks/{user_id}/{webhook_id}/test")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["triggered"], true);

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let res = client.get(format!("/api/webhooks/{user_id}/{webhook_id}/logs")).dispatch();
        let logs: Vec<serde_json::Value> = res.into_json().unwrap();
        if !logs.is_empty() {
            assert_eq!(logs[0]["success"], false);
            assert_eq!(logs[0]["event_type"], "otp");
            break;
        }
        if Instant::now() > deadline {
            panic!("webhook delivery never logged");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
