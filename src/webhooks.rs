use std::sync::Arc;

use rusqlite::params;
use tokio::sync::{broadcast, Semaphore};

use crate::db::Db;
use crate::events::GatewayEvent;
use crate::models::Webhook;

/// Subscription lookup, payload composition, per-destination retry with
/// backoff, delivery logging and stat counters. One engine instance is
/// shared by route handlers (direct fan-out for otp/announcement events)
/// and the background dispatcher that drains the `EventBus` for
/// supervisor-originated events (incoming messages, delivery receipts).
pub struct WebhookEngine {
    db: Arc<Db>,
    client: reqwest::Client,
    /// Bounds total concurrent in-flight deliveries across all webhooks,
    /// so a retry storm can't exhaust file descriptors by spawning one
    /// unbounded task per delivery.
    concurrency: Arc<Semaphore>,
    default_max_attempts: i64,
    default_retry_delay_secs: u64,
}

impl WebhookEngine {
    pub fn new(db: Arc<Db>, timeout_secs: u64, max_concurrency: usize, default_max_attempts: i64, default_retry_delay_secs: u64) -> Self {
        Self {
            db,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()
                .expect("Failed to create HTTP client"),
            concurrency: Arc::new(Semaphore::new(max_concurrency.max(1))),
            default_max_attempts,
            default_retry_delay_secs,
        }
    }

    /// Look up subscribed webhooks for (user, session, event_type) — type T
    /// or `all`, active only — and fan the composed payload out to each,
    /// fire-and-forget from the caller's perspective (retries run in
    /// background tasks).
    pub async fn fan_out(&self, user_id: &str, session_id: &str, event_type: &str, success: bool, mut payload: serde_json::Value) {
        if let Some(obj) = payload.as_object_mut() {
            obj.entry("timestamp").or_insert_with(|| serde_json::Value::String(chrono::Utc::now().to_rfc3339()));
        }

        let webhooks = self.subscribed_webhooks(user_id, session_id, event_type);
        for webhook in webhooks {
            let db = self.db.clone();
            let client = self.client.clone();
            let permit = self.concurrency.clone();
            let event_type = event_type.to_string();
            let payload = payload.clone();
            let default_max_attempts = self.default_max_attempts;
            let default_retry_delay_secs = self.default_retry_delay_secs;
            tokio::spawn(async move {
                let _permit = permit.acquire_owned().await;
                deliver_with_retry(&db, &client, webhook, &event_type, success, payload, default_max_attempts, default_retry_delay_secs).await;
            });
        }
    }

    fn subscribed_webhooks(&self, user_id: &str, session_id: &str, event_type: &str) -> Vec<Webhook> {
        let conn = self.db.conn();
        let mut stmt = match conn.prepare(
            "SELECT id, user_id, session_id, webhook_type, url, success_url, failure_url, custom_payload, headers,
                    max_attempts, retry_delay_secs, retry_on_failure, is_active, total_calls, success_calls, failed_calls,
                    last_called_at, last_success_at, last_failure_at, created_at
             FROM webhooks
             WHERE user_id = ?1 AND session_id = ?2 AND is_active = 1 AND (webhook_type = ?3 OR webhook_type = 'all')",
        ) {
            Ok(s) => s,
            Err(_) => return Vec::new(),
        };

        stmt.query_map(params![user_id, session_id, event_type], row_to_webhook)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }
}

pub fn row_to_webhook(row: &rusqlite::Row) -> rusqlite::Result<Webhook> {
    let custom_payload: String = row.get(7)?;
    let headers: String = row.get(8)?;
    Ok(Webhook {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        webhook_type: row.get(3)?,
        url: row.get(4)?,
        success_url: row.get(5)?,
        failure_url: row.get(6)?,
        custom_payload: serde_json::from_str(&custom_payload).unwrap_or(serde_json::json!({})),
        headers: serde_json::from_str(&headers).unwrap_or(serde_json::json!({})),
        max_attempts: row.get(9)?,
        retry_delay_secs: row.get(10)?,
        retry_on_failure: row.get::<_, i64>(11)? != 0,
        is_active: row.get::<_, i64>(12)? != 0,
        total_calls: row.get(13)?,
        success_calls: row.get(14)?,
        failed_calls: row.get(15)?,
        last_called_at: row.get(16)?,
        last_success_at: row.get(17)?,
        last_failure_at: row.get(18)?,
        created_at: row.get(19)?,
    })
}

/// A successful event with `success_url` configured goes there, a failed
/// one to `failure_url`, else the primary URL.
fn select_url(webhook: &Webhook, success: bool) -> &str {
    if success {
        webhook.success_url.as_deref().unwrap_or(&webhook.url)
    } else {
        webhook.failure_url.as_deref().unwrap_or(&webhook.url)
    }
}

/// Deep-merge `custom_payload` over the engine-built payload — overlay keys
/// win on conflict, nested objects merge recursively.
fn deep_merge(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_val) => deep_merge(base_val, overlay_val),
                    None => {
                        base_map.insert(key.clone(), overlay_val.clone());
                    }
                }
            }
        }
        (base_slot, overlay_val) => {
            *base_slot = overlay_val.clone();
        }
    }
}

async fn deliver_with_retry(
    db: &Db,
    client: &reqwest::Client,
    webhook: Webhook,
    event_type: &str,
    success: bool,
    mut payload: serde_json::Value,
    default_max_attempts: i64,
    default_retry_delay_secs: u64,
) {
    deep_merge(&mut payload, &webhook.custom_payload);

    let url = select_url(&webhook, success).to_string();
    let body = payload.to_string();
    let max_attempts = if webhook.max_attempts > 0 { webhook.max_attempts } else { default_max_attempts };
    let retry_delay = if webhook.retry_delay_secs > 0 {
        webhook.retry_delay_secs as u64
    } else {
        default_retry_delay_secs
    };

    let mut headers = std::collections::HashMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers.insert("User-Agent".to_string(), "wa-gateway-webhooks/1.0".to_string());
    if let Some(custom_headers) = webhook.headers.as_object() {
        for (k, v) in custom_headers {
            if let Some(v) = v.as_str() {
                headers.insert(k.clone(), v.to_string());
            }
        }
    }

    let attempts_allowed = if webhook.retry_on_failure { max_attempts.max(1) } else { 1 };

    let mut final_success = false;
    for attempt in 1..=attempts_allowed {
        let is_retry = attempt > 1;
        let mut req = client.post(&url).body(body.clone());
        for (k, v) in &headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let (response_status, response_body, delivery_ok, error_message) = match req.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let ok = (200..300).contains(&status);
                let text = resp.text().await.unwrap_or_default();
                let truncated: String = text.chars().take(500).collect();
                (Some(status as i64), Some(truncated), ok, None)
            }
            Err(e) => (None, None, false, Some(e.to_string())),
        };

        log_attempt(db, &webhook.id, event_type, &payload, response_status, response_body.as_deref(), delivery_ok, error_message.as_deref(), attempt, is_retry);

        if delivery_ok {
            final_success = true;
            break;
        }
        if attempt < attempts_allowed {
            tokio::time::sleep(std::time::Duration::from_secs(retry_delay)).await;
        }
    }

    update_stats(db, &webhook.id, final_success);
}

fn log_attempt(
    db: &Db,
    webhook_id: &str,
    event_type: &str,
    payload: &serde_json::Value,
    response_status: Option<i64>,
    response_body: Option<&str>,
    success: bool,
    error_message: Option<&str>,
    attempt: i64,
    is_retry: bool,
) {
    let now = chrono::Utc::now().to_rfc3339();
    db.conn()
        .execute(
            "INSERT INTO webhook_logs (id, webhook_id, event_type, payload, response_status, response_body, success, error_message, attempt, is_retry, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                uuid::Uuid::new_v4().to_string(),
                webhook_id,
                event_type,
                payload.to_string(),
                response_status,
                response_body,
                success,
                error_message,
                attempt,
                is_retry,
                &now,
            ],
        )
        .ok();
}

/// Final success or final failure updates the webhook's cumulative stats
/// via one statement.
fn update_stats(db: &Db, webhook_id: &str, success: bool) {
    let now = chrono::Utc::now().to_rfc3339();
    if success {
        db.conn()
            .execute(
                "UPDATE webhooks SET total_calls = total_calls + 1, success_calls = success_calls + 1,
                 last_called_at = ?1, last_success_at = ?1 WHERE id = ?2",
                params![&now, webhook_id],
            )
            .ok();
    } else {
        db.conn()
            .execute(
                "UPDATE webhooks SET total_calls = total_calls + 1, failed_calls = failed_calls + 1,
                 last_called_at = ?1, last_failure_at = ?1 WHERE id = ?2",
                params![&now, webhook_id],
            )
            .ok();
    }
}

/// Background dispatcher: drains the `EventBus` for supervisor-originated
/// events (incoming messages, delivery receipts, connection changes) and
/// fans each out. Events produced directly by the admission pipeline
/// (otp_sent/otp_failed/announcement_sent) go through `fan_out` directly
/// from the route handler instead, since they need the pipeline's outcome
/// in hand before a payload can be built.
pub fn spawn_dispatcher(mut receiver: broadcast::Receiver<GatewayEvent>, engine: Arc<WebhookEngine>, db: Arc<Db>) {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => handle_event(&engine, &db, event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    eprintln!("webhook dispatcher lagged, missed {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    eprintln!("webhook dispatcher: event bus closed, exiting");
                    break;
                }
            }
        }
    });
}

async fn handle_event(engine: &WebhookEngine, db: &Db, event: GatewayEvent) {
    match event {
        GatewayEvent::IncomingText { session_id, from, body } => {
            let user_id = user_for_session(db, &session_id);
            let now = chrono::Utc::now().to_rfc3339();
            engine
                .fan_out(
                    &user_id,
                    &session_id,
                    "incoming_text",
                    true,
                    serde_json::json!({"event": "message_received", "messageType": "text", "from": from, "text": body, "timestamp": now}),
                )
                .await;
            engine
                .fan_out(
                    &user_id,
                    &session_id,
                    "incoming_message",
                    true,
                    serde_json::json!({"event": "message_received", "messageType": "text", "from": from, "text": body, "timestamp": now}),
                )
                .await;
        }
        GatewayEvent::IncomingMedia { session_id, from, media_type, url } => {
            let user_id = user_for_session(db, &session_id);
            let now = chrono::Utc::now().to_rfc3339();
            engine
                .fan_out(
                    &user_id,
                    &session_id,
                    "incoming_media",
                    true,
                    serde_json::json!({"event": "message_received", "messageType": media_type, "from": from, "mediaUrl": url, "timestamp": now}),
                )
                .await;
            engine
                .fan_out(
                    &user_id,
                    &session_id,
                    "incoming_message",
                    true,
                    serde_json::json!({"event": "message_received", "messageType": media_type, "from": from, "mediaUrl": url, "timestamp": now}),
                )
                .await;
        }
        GatewayEvent::IncomingLocation { session_id, from, latitude, longitude } => {
            let user_id = user_for_session(db, &session_id);
            let now = chrono::Utc::now().to_rfc3339();
            engine
                .fan_out(
                    &user_id,
                    &session_id,
                    "incoming_location",
                    true,
                    serde_json::json!({"event": "message_received", "messageType": "location", "from": from, "latitude": latitude, "longitude": longitude, "timestamp": now}),
                )
                .await;
            engine
                .fan_out(
                    &user_id,
                    &session_id,
                    "incoming_message",
                    true,
                    serde_json::json!({"event": "message_received", "messageType": "location", "from": from, "latitude": latitude, "longitude": longitude, "timestamp": now}),
                )
                .await;
        }
        GatewayEvent::MessageDelivered { session_id, message_id, recipient } => {
            let user_id = user_for_session(db, &session_id);
            engine
                .fan_out(
                    &user_id,
                    &session_id,
                    "message_delivered",
                    true,
                    serde_json::json!({"event": "message_delivered", "messageId": message_id, "recipient": recipient}),
                )
                .await;
        }
        GatewayEvent::MessageRead { session_id, message_id, recipient } => {
            let user_id = user_for_session(db, &session_id);
            engine
                .fan_out(
                    &user_id,
                    &session_id,
                    "message_read",
                    true,
                    serde_json::json!({"event": "message_read", "messageId": message_id, "recipient": recipient}),
                )
                .await;
        }
        // Otp/Announcement are dispatched directly from the admission pipeline;
        // ConnectionChanged has no webhook subscription type of its own.
        GatewayEvent::Otp { .. } | GatewayEvent::Announcement { .. } | GatewayEvent::ConnectionChanged { .. } => {}
    }
}

fn user_for_session(db: &Db, session_id: &str) -> String {
    db.conn()
        .query_row("SELECT user_id FROM sessions WHERE id = ?1", params![session_id], |r| r.get(0))
        .unwrap_or_default()
}
