use rocket::http::{ContentType, Status};

use crate::common::{api_key_for, connect_and_wait, test_client, unique_id};

#[test]
fn missing_api_key_is_unauthorized() {
    let client = test_client();
    let res = client.get("/api/v1/auth/info").dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn unknown_api_key_is_unauthorized() {
    let client = test_client();
    let res = client.get("/api/v1/auth/info").header(rocket::http::Header::new("X-API-Key", "wass_not-a-real-key")).dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn auth_info_echoes_the_bound_user_and_session() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);
    let key = api_key_for(&client, &session_id);

    let res = client.get("/api/v1/auth/info").header(rocket::http::Header::new("X-API-Key", key)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["user_id"], user_id);
    assert_eq!(body["session_id"], session_id);
}

#[test]
fn authorization_bearer_header_works_the_same_as_x_api_key() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);
    let key = api_key_for(&client, &session_id);

    let res = client
        .get("/api/v1/auth/info")
        .header(rocket::http::Header::new("Authorization", format!("Bearer {key}")))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
}

#[test]
fn session_status_reflects_the_live_session_row() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);
    let key = api_key_for(&client, &session_id);

    let res = client.get("/api/v1/session/status").header(rocket::http::Header::new("X-API-Key", key)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "connected");
}

#[test]
fn v1_send_and_send_bulk_debit_the_bound_users_wallet() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);
    let key = api_key_for(&client, &session_id);
    let auth = rocket::http::Header::new("X-API-Key", key);

    let res = client
        .post("/api/v1/messages/send")
        .header(ContentType::JSON)
        .header(auth.clone())
        .body(r#"{"recipient":"201234567890","message":"hi"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["balance_after"], 990);

    let res = client
        .post("/api/v1/messages/send-bulk")
        .header(ContentType::JSON)
        .header(auth.clone())
        .body(r#"{"recipients":["201111111111","201222222222"],"message":"promo"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["sent"], 2);

    let res = client.get("/api/v1/wallet/balance").header(auth).dispatch();
    let wallet: serde_json::Value = res.into_json().unwrap();
    assert_eq!(wallet["balance"], 970);
}

#[test]
fn v1_otp_send_uses_english_when_requested() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);
    let key = api_key_for(&client, &session_id);

    let res = client
        .post("/api/v1/otp/send")
        .header(ContentType::JSON)
        .header(rocket::http::Header::new("X-API-Key", key))
        .body(r#"{"recipient":"201234567890","code":"9910","language":"en"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
}

#[test]
fn v1_wallet_transactions_lists_the_debit_from_a_send() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);
    let key = api_key_for(&client, &session_id);
    let auth = rocket::http::Header::new("X-API-Key", key);

    client
        .post("/api/v1/messages/send")
        .header(ContentType::JSON)
        .header(auth.clone())
        .body(r#"{"recipient":"201234567890","message":"hi"}"#)
        .dispatch();

    let res = client.get("/api/v1/wallet/transactions").header(auth).dispatch();
    let txns: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0]["txn_type"], "debit");
}
