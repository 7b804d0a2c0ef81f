use rocket::http::{ContentType, Status};

use crate::common::{connect_and_wait, test_client, unique_id};

#[test]
fn connect_then_session_reaches_connected() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);

    let res = client.get(format!("/api/whatsapp/session/{session_id}")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "connected");
    assert_eq!(body["user_id"], user_id);
    assert!(body["phone_number"].as_str().is_some());
}

#[test]
fn connect_rejects_blank_ids() {
    let client = test_client();
    let res = client
        .post("/api/whatsapp/connect")
        .header(ContentType::JSON)
        .body(r#"{"user_id":"  ","session_id":"s1"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn duplicate_connect_for_same_user_is_rejected() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_a = unique_id("session");
    let session_b = unique_id("session");
    connect_and_wait(&client, &user_id, &session_a);

    let res = client
        .post("/api/whatsapp/connect")
        .header(ContentType::JSON)
        .body(format!(r#"{{"user_id":"{user_id}","session_id":"{session_b}"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn get_session_unknown_id_is_not_found() {
    let client = test_client();
    let res = client.get("/api/whatsapp/session/does-not-exist").dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn disconnect_removes_the_session_row() {
    let client = test_client();
    let user_id = unique_id("user");
    let session_id = unique_id("session");
    connect_and_wait(&client, &user_id, &session_id);

    let res = client.post(format!("/api/whatsapp/disconnect/{session_id}")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["disconnected"], true);

    let res = client.get(format!("/api/whatsapp/session/{session_id}")).dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn disconnect_of_unknown_session_is_a_no_op_not_an_error() {
    let client = test_client();
    let res = client.post("/api/whatsapp/disconnect/never-existed").dispatch();
    assert_eq!(res.status(), Status::Ok);
}
