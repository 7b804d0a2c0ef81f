use std::sync::Arc;
use std::time::Duration;

use rusqlite::params;
use tokio::sync::{mpsc, oneshot, watch};

use crate::browser_worker::{BrowserWorker, WorkerEvent};
use crate::db::Db;
use crate::events::{EventBus, GatewayEvent};
use crate::models::SessionStatus;
use crate::registry::SessionRegistry;
use crate::session_storage::SessionStorageService;

/// What a caller asks a supervisor to send.
#[derive(Debug, Clone)]
pub struct SendEnvelope {
    pub recipient_digits: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message_id: String,
}

#[derive(Debug, Clone)]
pub enum SendError {
    NotReady,
    UnreachableRecipient,
    SessionClosed,
    SendFailed(String),
}

enum SupervisorCommand {
    Send {
        envelope: SendEnvelope,
        reply: oneshot::Sender<Result<SendOutcome, SendError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Cheap, cloneable reference to a running supervisor actor. Reads of
/// `status()` are lock-free (a `watch` channel); `send`/`disconnect` go
/// through the actor's command queue so no two operations race inside one
/// supervisor's state.
#[derive(Clone)]
pub struct SupervisorHandle {
    pub session_id: String,
    tx: mpsc::Sender<SupervisorCommand>,
    status: watch::Receiver<SessionStatus>,
}

impl SupervisorHandle {
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == SessionStatus::Connected
    }

    pub async fn send(&self, envelope: SendEnvelope) -> Result<SendOutcome, SendError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SupervisorCommand::Send {
                envelope,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SendError::NotReady)?;
        reply_rx.await.unwrap_or(Err(SendError::NotReady))
    }

    pub async fn disconnect(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(SupervisorCommand::Disconnect { reply: reply_tx })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }
}

/// Spawn a supervisor actor for `session_id`, owned by `user_id`. `worker`
/// is the already-constructed `BrowserWorker` this supervisor will drive for
/// its entire lifetime. `registry` is the process-wide directory this
/// supervisor clears its own entry from on every terminal transition — per
/// §4.F, removal happens only from terminal states inside the supervisor.
pub fn spawn(
    session_id: String,
    user_id: String,
    db: Arc<Db>,
    events: Arc<EventBus>,
    storage: Arc<SessionStorageService>,
    worker: Arc<dyn BrowserWorker>,
    auth_root: String,
    registry: Arc<SessionRegistry>,
) -> SupervisorHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (status_tx, status_rx) = watch::channel(SessionStatus::Initializing);

    tokio::spawn(run(
        session_id.clone(),
        user_id,
        db,
        events,
        storage,
        worker,
        auth_root,
        registry,
        cmd_rx,
        status_tx,
    ));

    SupervisorHandle {
        session_id,
        tx: cmd_tx,
        status: status_rx,
    }
}

async fn run(
    session_id: String,
    user_id: String,
    db: Arc<Db>,
    events: Arc<EventBus>,
    storage: Arc<SessionStorageService>,
    worker: Arc<dyn BrowserWorker>,
    auth_root: String,
    registry: Arc<SessionRegistry>,
    mut cmd_rx: mpsc::Receiver<SupervisorCommand>,
    status_tx: watch::Sender<SessionStatus>,
) {
    let restored = storage.restore(&session_id).await.unwrap_or(false);
    let deadline_secs = if restored { 120 } else { 300 };

    log_connection_event(
        &db,
        &session_id,
        "reconnecting",
        serde_json::json!({"restored": restored}),
    );

    let auth_path = format!("{auth_root}/{session_id}");
    let mut worker_events = worker.init(&auth_path).await;

    let deadline = tokio::time::sleep(Duration::from_secs(deadline_secs));
    tokio::pin!(deadline);
    let mut armed = true;

    loop {
        tokio::select! {
            _ = &mut deadline, if armed => {
                let terminal = if restored { SessionStatus::Disconnected } else { SessionStatus::Failed };
                set_status(&db, &session_id, terminal);
                let _ = status_tx.send(terminal);
                log_connection_event(&db, &session_id, "error", serde_json::json!({"reason": "initialization deadline exceeded"}));
                registry.remove(&session_id);
                break;
            }
            event = worker_events.recv() => {
                match event {
                    Some(WorkerEvent::Qr(code)) => {
                        set_qr(&db, &session_id, &code);
                        set_status(&db, &session_id, SessionStatus::QrPending);
                        let _ = status_tx.send(SessionStatus::QrPending);
                    }
                    Some(WorkerEvent::Authenticated) => {
                        set_status(&db, &session_id, SessionStatus::Connecting);
                        let _ = status_tx.send(SessionStatus::Connecting);
                        let storage = storage.clone();
                        let sid = session_id.clone();
                        tokio::spawn(async move {
                            if let Err(e) = storage.backup(&sid).await {
                                eprintln!("session {sid}: auth backup failed: {e}");
                            }
                        });
                    }
                    Some(WorkerEvent::Ready) => {
                        on_ready(&db, &events, worker.as_ref(), &session_id, &user_id).await;
                        let _ = status_tx.send(SessionStatus::Connected);
                        armed = false; // no more deadline once connected
                    }
                    Some(WorkerEvent::AuthFailure(reason)) => {
                        set_status(&db, &session_id, SessionStatus::Failed);
                        let _ = status_tx.send(SessionStatus::Failed);
                        log_connection_event(&db, &session_id, "error", serde_json::json!({"reason": reason}));
                        registry.remove(&session_id);
                        break;
                    }
                    Some(WorkerEvent::Disconnected(reason)) => {
                        set_status(&db, &session_id, SessionStatus::Disconnected);
                        let _ = status_tx.send(SessionStatus::Disconnected);
                        log_connection_event(&db, &session_id, "disconnected", serde_json::json!({"reason": reason}));
                        registry.remove(&session_id);
                        break;
                    }
                    Some(WorkerEvent::Message(msg)) => {
                        handle_incoming(&events, &session_id, msg);
                    }
                    Some(WorkerEvent::MessageAck { message_id, ack }) => {
                        handle_ack(&db, &events, &session_id, &message_id, ack);
                    }
                    None => {
                        registry.remove(&session_id);
                        break;
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SupervisorCommand::Send { envelope, reply }) => {
                        let outcome = handle_send(&db, worker.as_ref(), &status_tx, &session_id, envelope).await;
                        let _ = reply.send(outcome);
                    }
                    Some(SupervisorCommand::Disconnect { reply }) => {
                        set_status(&db, &session_id, SessionStatus::Disconnected);
                        let _ = status_tx.send(SessionStatus::Disconnected);
                        log_connection_event(&db, &session_id, "disconnected", serde_json::json!({"reason": "explicit logout"}));
                        if let Err(e) = storage.delete(&session_id).await {
                            eprintln!("session {session_id}: auth directory delete failed: {e}");
                        }
                        registry.remove(&session_id);
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        registry.remove(&session_id);
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_send(
    db: &Db,
    worker: &dyn BrowserWorker,
    status_tx: &watch::Sender<SessionStatus>,
    session_id: &str,
    envelope: SendEnvelope,
) -> Result<SendOutcome, SendError> {
    if *status_tx.borrow() != SessionStatus::Connected {
        return Err(SendError::NotReady);
    }

    let chat_id = match worker.resolve_number(&envelope.recipient_digits).await {
        Ok(Some(chat_id)) => chat_id,
        Ok(None) => return Err(SendError::UnreachableRecipient),
        Err(_) => return Err(SendError::UnreachableRecipient),
    };

    match worker.send_text(&chat_id, &envelope.body).await {
        Ok(message_id) => {
            let now = chrono::Utc::now().to_rfc3339();
            db.conn()
                .execute(
                    "INSERT INTO message_delivery_tracking (message_id, session_id, recipient, status, sent_at)
                     VALUES (?1, ?2, ?3, 'sent', ?4)",
                    params![&message_id, session_id, &envelope.recipient_digits, &now],
                )
                .ok();
            Ok(SendOutcome { message_id })
        }
        Err(reason) if reason.contains("Session closed") => {
            set_status(db, session_id, SessionStatus::Disconnected);
            let _ = status_tx.send(SessionStatus::Disconnected);
            log_connection_event(db, session_id, "disconnected", serde_json::json!({"reason": "session closed"}));
            Err(SendError::SessionClosed)
        }
        Err(reason) => Err(SendError::SendFailed(reason)),
    }
}

/// On ready: populate phone identity, clear QR, demote sibling sessions,
/// issue an API key if absent, and increment `numbers_used` once per
/// distinct phone number for this user (keyed on phone-number distinctness,
/// not connection count — see DESIGN.md).
async fn on_ready(db: &Db, events: &EventBus, worker: &dyn BrowserWorker, session_id: &str, user_id: &str) {
    let state = worker.query_state().await;
    let now = chrono::Utc::now().to_rfc3339();
    let phone = state.phone_number.clone().unwrap_or_default();

    let conn = db.conn();
    conn.execute(
        "UPDATE sessions SET phone_number = ?1, qr_code = NULL, status = 'connected', last_activity = ?2 WHERE id = ?3",
        params![&phone, &now, session_id],
    )
    .ok();

    conn.execute(
        "UPDATE sessions SET status = 'disconnected' WHERE user_id = ?1 AND id != ?2 AND status = 'connected'",
        params![user_id, session_id],
    )
    .ok();

    let has_key: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM api_keys WHERE session_id = ?1 AND active = 1",
            params![session_id],
            |r| r.get::<_, i64>(0),
        )
        .unwrap_or(0)
        > 0;
    if !has_key {
        let key = crate::db::generate_api_key();
        let secret = crate::db::generate_api_secret();
        conn.execute(
            "INSERT INTO api_keys (key, secret, user_id, session_id, active, usage_count, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, 0, ?5)",
            params![&key, &secret, user_id, session_id, &now],
        )
        .ok();
    }

    crate::db::ensure_subscription(&conn, user_id);
    if !phone.is_empty() {
        let already_counted: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM sessions WHERE user_id = ?1 AND phone_number = ?2 AND status = 'connected' AND id != ?3",
                params![user_id, &phone, session_id],
                |r| r.get::<_, i64>(0),
            )
            .unwrap_or(0)
            > 0;
        if !already_counted {
            conn.execute(
                "UPDATE subscriptions SET numbers_used = numbers_used + 1 WHERE user_id = ?1",
                params![user_id],
            )
            .ok();
        }
    }
    drop(conn);

    events.publish(GatewayEvent::ConnectionChanged {
        session_id: session_id.to_string(),
        event_type: "connected".to_string(),
        details: serde_json::json!({"phone_number": phone}),
    });
    log_connection_event(db, session_id, "connected", serde_json::json!({"phone_number": phone}));
}

fn handle_incoming(events: &EventBus, session_id: &str, msg: crate::browser_worker::IncomingMessage) {
    if msg.is_broadcast {
        return; // status@broadcast messages are dropped
    }
    let from = bare_number(&msg.from);
    match msg.kind.as_str() {
        "location" => events.publish(GatewayEvent::IncomingLocation {
            session_id: session_id.to_string(),
            from,
            latitude: msg.latitude.unwrap_or(0.0),
            longitude: msg.longitude.unwrap_or(0.0),
        }),
        "media" => events.publish(GatewayEvent::IncomingMedia {
            session_id: session_id.to_string(),
            from,
            media_type: msg.kind,
            url: msg.media_url.unwrap_or_default(),
        }),
        _ => events.publish(GatewayEvent::IncomingText {
            session_id: session_id.to_string(),
            from,
            body: msg.body,
        }),
    }
}

/// Worker chat ids are wire-addressed as `<digits>@c.us` (or `@g.us` for
/// group noise); webhook consumers want the bare recipient digits (scenario
/// 6: `"9647812345678@c.us"` → `from:"9647812345678"`).
fn bare_number(from: &str) -> String {
    from.split('@').next().unwrap_or(from).to_string()
}

fn handle_ack(db: &Db, events: &EventBus, session_id: &str, message_id: &str, ack: u8) {
    let now = chrono::Utc::now().to_rfc3339();
    let (column, status, event) = match ack {
        2 => ("delivered_at", "delivered", Some("delivered")),
        3 => ("read_at", "read", Some("read")),
        _ => return,
    };
    db.conn()
        .execute(
            &format!("UPDATE message_delivery_tracking SET status = ?1, {column} = ?2 WHERE message_id = ?3"),
            params![status, &now, message_id],
        )
        .ok();

    let recipient: String = db
        .conn()
        .query_row(
            "SELECT recipient FROM message_delivery_tracking WHERE message_id = ?1",
            params![message_id],
            |r| r.get(0),
        )
        .unwrap_or_default();

    match event {
        Some("delivered") => events.publish(GatewayEvent::MessageDelivered {
            session_id: session_id.to_string(),
            message_id: message_id.to_string(),
            recipient,
        }),
        Some("read") => events.publish(GatewayEvent::MessageRead {
            session_id: session_id.to_string(),
            message_id: message_id.to_string(),
            recipient,
        }),
        _ => {}
    }
}

fn set_status(db: &Db, session_id: &str, status: SessionStatus) {
    let now = chrono::Utc::now().to_rfc3339();
    db.conn()
        .execute(
            "UPDATE sessions SET status = ?1, last_activity = ?2 WHERE id = ?3",
            params![status.as_str(), &now, session_id],
        )
        .ok();
}

fn set_qr(db: &Db, session_id: &str, qr: &str) {
    let now = chrono::Utc::now().to_rfc3339();
    db.conn()
        .execute(
            "UPDATE sessions SET qr_code = ?1, last_activity = ?2 WHERE id = ?3",
            params![qr, &now, session_id],
        )
        .ok();
}

fn log_connection_event(db: &Db, session_id: &str, event_type: &str, details: serde_json::Value) {
    let now = chrono::Utc::now().to_rfc3339();
    db.conn()
        .execute(
            "INSERT INTO connection_events (id, session_id, event_type, details, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![uuid::Uuid::new_v4().to_string(), session_id, event_type, details.to_string(), &now],
        )
        .ok();
}
