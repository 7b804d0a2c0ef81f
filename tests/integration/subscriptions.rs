use rocket::http::{ContentType, Status};

use crate::common::{connect_and_wait, seed_subscription, test_client, unique_id};

#[test]
fn subscription_tiers_lists_the_known_tiers() {
    let client = test_client();
    let res = client.get("/api/subscriptions/tiers").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["basic"]["messages"], 1200);
    assert!(body["premium"]["messages"].is_null());
}

#[test]
fn get_subscription_defaults_a_new_user_to_basic() {
    let client = test_client();
    let user_id = unique_id("user");
    let res = client.get(format!("/api/subscriptions/{user_id}")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["tier"], "basic");
    assert_eq!(body["messages_used"], 0);
}

#[test]
fn upsert_subscription_changes_the_tier() {
    let client = test_client();
    let user_id = unique_id("user");
    let res = client
        .post(format!("/api/subscriptions/{user_id}"))
        .header(ContentType::JSON)
        .body(r#"{"tier":"premium"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get(format!("/api/subscriptions/{user_id}")).dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["tier"], "premium");
}

#[test]
fn basic_tier_blocks_sends_once_the_message_quota_is_exhausted() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);
    seed_subscription(&client, &user_id, "basic", 1200);

    let res = client
        .post("/api/whatsapp/test-message")
        .header(ContentType::JSON)
        .body(format!(r#"{{"user_id":"{user_id}","session_id":"{session_id}","recipient":"201234567890","message":"hi"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn premium_tier_sends_regardless_of_usage() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);
    seed_subscription(&client, &user_id, "premium", 50_000);

    let res = client
        .post("/api/whatsapp/test-message")
        .header(ContentType::JSON)
        .body(format!(r#"{{"user_id":"{user_id}","session_id":"{session_id}","recipient":"201234567890","message":"hi"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
}
