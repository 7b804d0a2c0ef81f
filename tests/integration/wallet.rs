use rocket::http::{ContentType, Status};

use crate::common::{connect_and_wait, set_wallet_balance, test_client, unique_id};

#[test]
fn wallet_balance_seeds_the_configured_initial_balance() {
    let client = test_client();
    let user_id = unique_id("user");
    let res = client.get(format!("/api/wallet/balance/{user_id}")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["balance"], 1000);
}

#[test]
fn topup_credits_the_balance_and_is_logged_as_a_transaction() {
    let client = test_client();
    let user_id = unique_id("user");
    client.get(format!("/api/wallet/balance/{user_id}")).dispatch();

    let res = client
        .post(format!("/api/wallet/topup/{user_id}"))
        .header(ContentType::JSON)
        .body(r#"{"amount":500}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let txn: serde_json::Value = res.into_json().unwrap();
    assert_eq!(txn["txn_type"], "credit");
    assert_eq!(txn["amount"], 500);
    assert_eq!(txn["balance_after"], 1500);

    let res = client.get(format!("/api/wallet/balance/{user_id}")).dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["balance"], 1500);

    let res = client.get(format!("/api/wallet/transactions/{user_id}")).dispatch();
    let txns: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0]["txn_type"], "credit");
}

#[test]
fn topup_rejects_non_positive_amounts() {
    let client = test_client();
    let user_id = unique_id("user");
    let res = client
        .post(format!("/api/wallet/topup/{user_id}"))
        .header(ContentType::JSON)
        .body(r#"{"amount":0}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn send_with_insufficient_balance_is_rejected_and_leaves_balance_untouched() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);
    set_wallet_balance(&client, &user_id, 5);

    let res = client
        .post("/api/whatsapp/test-message")
        .header(ContentType::JSON)
        .body(format!(r#"{{"user_id":"{user_id}","session_id":"{session_id}","recipient":"201234567890","message":"hi"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::PaymentRequired);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["available"], 5);
    assert_eq!(body["required"], 10);

    let res = client.get(format!("/api/wallet/balance/{user_id}")).dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["balance"], 5);
}
