use std::sync::Arc;
use std::time::{Duration, Instant};

use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;
use rusqlite::params;

use wa_gateway::db::Db;

/// Wrapper around Client that auto-deletes the temp DB (and the auth-dir
/// mirror) on drop, so repeated test runs don't accumulate scratch files
/// under /tmp.
pub struct TestClient {
    client: Option<Client>,
    db_path: String,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        drop(self.client.take());
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
        let _ = std::fs::remove_dir_all(format!("{}-auth", self.db_path));
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

pub fn test_client() -> TestClient {
    let db_path = format!(
        "/tmp/wa_gateway_test_{}.db",
        uuid::Uuid::new_v4().to_string().split('-').next().unwrap()
    );
    let rocket = wa_gateway::rocket_with_db(&db_path);
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient { client: Some(client), db_path }
}

/// Connects a fresh session for `user_id`/`session_id` and blocks (via
/// short polling sleeps) until the simulated worker has brought it to
/// `connected`. Fails the test if that doesn't happen within a few seconds.
pub fn connect_and_wait(client: &Client, user_id: &str, session_id: &str) {
    let res = client
        .post("/api/whatsapp/connect")
        .header(ContentType::JSON)
        .body(format!(r#"{{"user_id":"{user_id}","session_id":"{session_id}"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok, "connect failed: {:?}", res.into_string());

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let res = client.get(format!("/api/whatsapp/session/{session_id}")).dispatch();
        let body: serde_json::Value = res.into_json().unwrap();
        if body["status"] == "connected" {
            return;
        }
        if Instant::now() > deadline {
            panic!("session {session_id} never reached connected, last seen: {body}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

pub fn db_of(client: &Client) -> Arc<Db> {
    client.rocket().state::<Arc<Db>>().expect("Db is managed state").clone()
}

/// The API key minted for a session the moment it becomes ready. Connect
/// (and wait) before calling this.
pub fn api_key_for(client: &Client, session_id: &str) -> String {
    let db = db_of(client);
    db.conn()
        .query_row("SELECT key FROM api_keys WHERE session_id = ?1", params![session_id], |r| r.get(0))
        .unwrap_or_else(|_| panic!("no api key minted for session {session_id}"))
}

pub fn set_wallet_balance(client: &Client, user_id: &str, balance: i64) {
    let db = db_of(client);
    let conn = db.conn();
    conn.execute(
        "INSERT INTO wallets (user_id, balance, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET balance = excluded.balance",
        params![user_id, balance, chrono::Utc::now().to_rfc3339()],
    )
    .unwrap();
}

/// Seeds (or overwrites) a user's subscription row directly, bypassing the
/// upsert endpoint, so tests can put usage right at a quota boundary
/// without sending hundreds of real messages first.
pub fn seed_subscription(client: &Client, user_id: &str, tier: &str, messages_used: i64) {
    let db = db_of(client);
    let conn = db.conn();
    wa_gateway::db::ensure_subscription(&conn, user_id);
    conn.execute(
        "UPDATE subscriptions SET tier = ?1, messages_used = ?2, active = 1 WHERE user_id = ?3",
        params![tier, messages_used, user_id],
    )
    .unwrap();
}

pub fn unique_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().to_string().split('-').next().unwrap())
}
