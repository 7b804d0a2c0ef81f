use rocket::http::{ContentType, Status};

use crate::common::{connect_and_wait, test_client, unique_id};

#[test]
fn get_settings_defaults_to_the_configured_rate_limit() {
    let client = test_client();
    let user_id = unique_id("user");
    let res = client.get(format!("/api/settings/{user_id}")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["per_minute"], 10);
    assert_eq!(body["per_hour"], 100);
    assert_eq!(body["per_day"], 1000);
}

#[test]
fn update_settings_only_touches_the_fields_given() {
    let client = test_client();
    let user_id = unique_id("user");
    client.get(format!("/api/settings/{user_id}")).dispatch();

    let res = client
        .put(format!("/api/settings/{user_id}"))
        .header(ContentType::JSON)
        .body(r#"{"per_minute":1}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["per_minute"], 1);
    assert_eq!(body["per_hour"], 100);
    assert_eq!(body["per_day"], 1000);
}

#[test]
fn exhausting_the_per_minute_window_returns_429_with_retry_after() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);

    client
        .put(format!("/api/settings/{user_id}"))
        .header(ContentType::JSON)
        .body(r#"{"per_minute":1}"#)
        .dispatch();

    let send = || {
        client
            .post("/api/whatsapp/test-message")
            .header(ContentType::JSON)
            .body(format!(r#"{{"user_id":"{user_id}","session_id":"{session_id}","recipient":"201234567890","message":"hi"}}"#))
            .dispatch()
    };

    let first = send();
    assert_eq!(first.status(), Status::Ok);

    let second = send();
    assert_eq!(second.status(), Status::TooManyRequests);
    assert_eq!(second.headers().get_one("Retry-After"), Some("60"));
    assert_eq!(second.headers().get_one("X-RateLimit-Limit"), Some("1"));
    let body: serde_json::Value = second.into_json().unwrap();
    assert_eq!(body["retry_after_secs"], 60);
    assert_eq!(body["reason"], "rate_limit_minute");
    assert_eq!(body["limit"], 1);
    assert_eq!(body["current"], 1);
}

#[test]
fn update_profile_is_idempotent_and_preserves_untouched_fields() {
    let client = test_client();
    let user_id = unique_id("user");

    let res = client
        .post(format!("/api/users/profile/{user_id}"))
        .header(ContentType::JSON)
        .body(r#"{"display_name":"Acme Support","timezone":"Africa/Cairo"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client
        .post(format!("/api/users/profile/{user_id}"))
        .header(ContentType::JSON)
        .body(r#"{"business_name":"Acme Inc"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["user_id"], user_id);
    assert!(body["updated_at"].as_str().is_some());
}
