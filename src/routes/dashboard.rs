use std::sync::Arc;

use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, State};
use rusqlite::params;

use crate::admission::{self, AdmissionContext};
use crate::config::Config;
use crate::db::Db;
use crate::models::*;
use crate::webhooks::WebhookEngine;

type JsonErr = (Status, Json<serde_json::Value>);

fn err(status: Status, msg: impl Into<String>) -> JsonErr {
    (status, Json(serde_json::json!({"error": msg.into()})))
}

// --- Session lifecycle ---

#[post("/api/whatsapp/connect", format = "json", data = "<body>")]
pub async fn connect(ctx: &State<Arc<AdmissionContext>>, body: Json<ConnectRequest>) -> Result<Json<Session>, JsonErr> {
    let user_id = body.user_id.trim().to_string();
    let session_id = body.session_id.trim().to_string();
    if user_id.is_empty() || session_id.is_empty() {
        return Err(err(Status::BadRequest, "userId and sessionId are required"));
    }

    {
        let conn = ctx.db.conn();
        // Duplicate connect guard: reject if the user already has a
        // `connected` session under a different id.
        let other_connected: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM sessions WHERE user_id = ?1 AND status = 'connected' AND id != ?2",
                params![&user_id, &session_id],
                |r| r.get::<_, i64>(0),
            )
            .unwrap_or(0)
            > 0;
        if other_connected {
            return Err(err(Status::BadRequest, "user already has a connected session"));
        }

        let exists: bool = conn
            .query_row("SELECT COUNT(*) FROM sessions WHERE id = ?1", params![&session_id], |r| r.get::<_, i64>(0))
            .unwrap_or(0)
            > 0;
        if !exists {
            let now = chrono::Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO sessions (id, user_id, status, last_activity, created_at) VALUES (?1, ?2, 'initializing', ?3, ?3)",
                params![&session_id, &user_id, &now],
            )
            .map_err(|e| err(Status::InternalServerError, e.to_string()))?;
        }
    }

    let worker = (ctx.worker_factory)();
    let registry = ctx.registry.clone();
    ctx.registry.create_if_absent(&session_id, || {
        crate::supervisor::spawn(
            session_id.clone(),
            user_id.clone(),
            ctx.db.clone(),
            ctx.events.clone(),
            ctx.storage.clone(),
            worker,
            ctx.auth_root.clone(),
            registry,
        )
    });

    load_session(&ctx.db, &session_id).ok_or_else(|| err(Status::InternalServerError, "session row missing after insert"))
}

#[get("/api/whatsapp/session/<session_id>")]
pub fn get_session(db: &State<Arc<Db>>, session_id: &str) -> Result<Json<Session>, JsonErr> {
    load_session(db, session_id).map(Json).ok_or_else(|| err(Status::NotFound, "session not found"))
}

#[post("/api/whatsapp/disconnect/<session_id>")]
pub async fn disconnect(ctx: &State<Arc<AdmissionContext>>, session_id: &str) -> Result<Json<serde_json::Value>, JsonErr> {
    if let Some(handle) = ctx.registry.get(session_id) {
        handle.disconnect().await;
        ctx.registry.remove(session_id);
    } else {
        if let Err(e) = ctx.storage.delete(session_id).await {
            eprintln!("disconnect {session_id}: auth directory delete failed: {e}");
        }
    }
    ctx.db.conn().execute("DELETE FROM sessions WHERE id = ?1", params![session_id]).ok();
    Ok(Json(serde_json::json!({"disconnected": true})))
}

fn load_session(db: &Db, session_id: &str) -> Option<Session> {
    db.conn()
        .query_row(
            "SELECT id, user_id, phone_number, status, qr_code, last_activity, created_at FROM sessions WHERE id = ?1",
            params![session_id],
            |row| {
                Ok(Session {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    phone_number: row.get(2)?,
                    status: row.get(3)?,
                    qr_code: row.get(4)?,
                    last_activity: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        )
        .ok()
}

// --- Outbound sends (via the admission pipeline) ---

#[derive(Debug, rocket::serde::Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct DashboardOtpRequest {
    pub user_id: String,
    pub session_id: String,
    pub recipient: String,
    pub code: String,
    #[serde(default = "default_lang")]
    pub language: String,
}

fn default_lang() -> String {
    "ar".to_string()
}

#[derive(Debug, rocket::serde::Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct DashboardAnnouncementRequest {
    pub user_id: String,
    pub session_id: String,
    pub recipients: Vec<String>,
    pub message: String,
}

#[derive(Debug, rocket::serde::Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct DashboardTestMessageRequest {
    pub user_id: String,
    pub session_id: String,
    pub recipient: String,
    pub message: String,
}

#[post("/api/whatsapp/send-otp", format = "json", data = "<body>")]
pub async fn send_otp(ctx: &State<Arc<AdmissionContext>>, body: Json<DashboardOtpRequest>) -> Result<Json<serde_json::Value>, crate::error::AppError> {
    let text = crate::send_executor::otp_message(&body.code, &body.language);
    let outcome = admission::admit_single(
        ctx,
        &body.user_id,
        &body.session_id,
        &body.recipient,
        &text,
        AutomationLogType::Otp,
        Some(&body.code),
    )
    .await?;
    Ok(Json(serde_json::json!({
        "status": "sent",
        "message_id": outcome.message_id,
        "balance_after": outcome.balance_after,
    })))
}

#[post("/api/whatsapp/send-announcement", format = "json", data = "<body>")]
pub async fn send_announcement(ctx: &State<Arc<AdmissionContext>>, body: Json<DashboardAnnouncementRequest>) -> Result<Json<BulkSendResponse>, crate::error::AppError> {
    let outcome = admission::admit_bulk(ctx, &body.user_id, &body.session_id, &body.recipients, &body.message).await?;
    Ok(Json(BulkSendResponse {
        sent: outcome.sent,
        failed: outcome.failed,
        results: outcome.results,
    }))
}

#[post("/api/whatsapp/test-message", format = "json", data = "<body>")]
pub async fn test_message(ctx: &State<Arc<AdmissionContext>>, body: Json<DashboardTestMessageRequest>) -> Result<Json<serde_json::Value>, crate::error::AppError> {
    let outcome = admission::admit_single(
        ctx,
        &body.user_id,
        &body.session_id,
        &body.recipient,
        &body.message,
        AutomationLogType::ApiMessage,
        None,
    )
    .await?;
    Ok(Json(serde_json::json!({
        "status": "sent",
        "message_id": outcome.message_id,
        "balance_after": outcome.balance_after,
    })))
}

// --- Wallet reads ---

#[get("/api/wallet/balance/<user_id>")]
pub fn wallet_balance(db: &State<Arc<Db>>, config: &State<Arc<Config>>, user_id: &str) -> Json<Wallet> {
    let conn = db.conn();
    Json(crate::wallet::get_or_create_wallet(&conn, user_id, config.initial_wallet_balance))
}

#[get("/api/wallet/transactions/<user_id>")]
pub fn wallet_transactions(db: &State<Arc<Db>>, user_id: &str) -> Json<Vec<WalletTransaction>> {
    Json(crate::wallet::list_transactions(&db.conn(), user_id, 100))
}

#[post("/api/wallet/topup/<user_id>", format = "json", data = "<body>")]
pub fn topup_wallet(db: &State<Arc<Db>>, config: &State<Arc<Config>>, user_id: &str, body: Json<TopupRequest>) -> Result<Json<WalletTransaction>, crate::error::AppError> {
    if body.amount <= 0 {
        return Err(crate::error::AppError::BadRequest("amount must be positive".to_string()));
    }
    let mut conn = db.conn();
    crate::db::ensure_wallet(&conn, user_id, config.initial_wallet_balance);
    let txn = crate::wallet::credit(&mut conn, user_id, None, body.amount, "wallet top-up", None, config.initial_wallet_balance)?;
    Ok(Json(txn))
}

// --- Webhook CRUD (`/api/webhooks/:userId[/...]`) ---

#[post("/api/webhooks/<user_id>", format = "json", data = "<body>")]
pub fn create_webhook(db: &State<Arc<Db>>, user_id: &str, body: Json<CreateWebhook>) -> Result<Json<Webhook>, JsonErr> {
    let webhook_type = body.webhook_type.clone();
    if WebhookEventType::from_str(&webhook_type).is_none() {
        return Err(err(Status::BadRequest, format!("unknown webhook_type: {webhook_type}")));
    }
    if !body.url.starts_with("http://") && !body.url.starts_with("https://") {
        return Err(err(Status::BadRequest, "url must start with http:// or https://"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let custom_payload = body.custom_payload.clone().unwrap_or(serde_json::json!({}));
    let headers = body.headers.clone().unwrap_or(serde_json::json!({}));
    let max_attempts = body.max_attempts.unwrap_or(3);
    let retry_delay_secs = body.retry_delay_secs.unwrap_or(5);

    let conn = db.conn();
    conn.execute(
        "INSERT INTO webhooks (id, user_id, session_id, webhook_type, url, success_url, failure_url, custom_payload, headers,
         max_attempts, retry_delay_secs, retry_on_failure, is_active, total_calls, success_calls, failed_calls, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1, 0, 0, 0, ?13)",
        params![
            &id,
            user_id,
            &body.session_id,
            &webhook_type,
            &body.url,
            &body.success_url,
            &body.failure_url,
            custom_payload.to_string(),
            headers.to_string(),
            max_attempts,
            retry_delay_secs,
            body.retry_on_failure,
            &now,
        ],
    )
    .map_err(|e| {
        if e.to_string().contains("UNIQUE") {
            err(Status::Conflict, "a webhook for this (user, session, type) already exists")
        } else {
            err(Status::InternalServerError, e.to_string())
        }
    })?;

    load_webhook(db, &id).ok_or_else(|| err(Status::InternalServerError, "webhook row missing after insert"))
}

#[get("/api/webhooks/<user_id>")]
pub fn list_webhooks(db: &State<Arc<Db>>, user_id: &str) -> Json<Vec<Webhook>> {
    let conn = db.conn();
    let mut stmt = conn
        .prepare(
            "SELECT id, user_id, session_id, webhook_type, url, success_url, failure_url, custom_payload, headers,
                    max_attempts, retry_delay_secs, retry_on_failure, is_active, total_calls, success_calls, failed_calls,
                    last_called_at, last_success_at, last_failure_at, created_at
             FROM webhooks WHERE user_id = ?1 ORDER BY created_at DESC",
        )
        .unwrap();
    let rows = stmt
        .query_map(params![user_id], crate::webhooks::row_to_webhook)
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default();
    Json(rows)
}

#[put("/api/webhooks/<user_id>/<webhook_id>", format = "json", data = "<body>")]
pub fn update_webhook(db: &State<Arc<Db>>, user_id: &str, webhook_id: &str, body: Json<UpdateWebhook>) -> Result<Json<Webhook>, JsonErr> {
    let conn = db.conn();
    let owned: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM webhooks WHERE id = ?1 AND user_id = ?2",
            params![webhook_id, user_id],
            |r| r.get::<_, i64>(0),
        )
        .unwrap_or(0)
        > 0;
    if !owned {
        return Err(err(Status::NotFound, "webhook not found"));
    }

    let mut updates: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    macro_rules! set_field {
        ($col:literal, $val:expr) => {
            updates.push(format!("{} = ?{}", $col, updates.len() + 1));
            values.push(Box::new($val));
        };
    }
    if let Some(ref url) = body.url {
        set_field!("url", url.clone());
    }
    if let Some(ref success_url) = body.success_url {
        set_field!("success_url", success_url.clone());
    }
    if let Some(ref failure_url) = body.failure_url {
        set_field!("failure_url", failure_url.clone());
    }
    if let Some(ref custom_payload) = body.custom_payload {
        set_field!("custom_payload", custom_payload.to_string());
    }
    if let Some(ref headers) = body.headers {
        set_field!("headers", headers.to_string());
    }
    if let Some(max_attempts) = body.max_attempts {
        set_field!("max_attempts", max_attempts);
    }
    if let Some(retry_delay_secs) = body.retry_delay_secs {
        set_field!("retry_delay_secs", retry_delay_secs);
    }
    if let Some(retry_on_failure) = body.retry_on_failure {
        set_field!("retry_on_failure", retry_on_failure);
    }
    if let Some(is_active) = body.is_active {
        set_field!("is_active", is_active);
    }
    if updates.is_empty() {
        return Err(err(Status::BadRequest, "no fields to update"));
    }

    let idx = updates.len() + 1;
    let sql = format!("UPDATE webhooks SET {} WHERE id = ?{}", updates.join(", "), idx);
    values.push(Box::new(webhook_id.to_string()));
    let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    conn.execute(&sql, param_refs.as_slice()).map_err(|e| err(Status::InternalServerError, e.to_string()))?;
    drop(conn);

    load_webhook(db, webhook_id).ok_or_else(|| err(Status::InternalServerError, "webhook row missing after update"))
}

#[delete("/api/webhooks/<user_id>/<webhook_id>")]
pub fn delete_webhook(db: &State<Arc<Db>>, user_id: &str, webhook_id: &str) -> Result<Json<serde_json::Value>, JsonErr> {
    let deleted = db
        .conn()
        .execute("DELETE FROM webhooks WHERE id = ?1 AND user_id = ?2", params![webhook_id, user_id])
        .unwrap_or(0);
    if deleted == 0 {
        return Err(err(Status::NotFound, "webhook not found"));
    }
    Ok(Json(serde_json::json!({"deleted": true})))
}

#[get("/api/webhooks/<user_id>/<webhook_id>/logs")]
pub fn webhook_logs(db: &State<Arc<Db>>, user_id: &str, webhook_id: &str) -> Result<Json<Vec<WebhookLog>>, JsonErr> {
    let conn = db.conn();
    let owned: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM webhooks WHERE id = ?1 AND user_id = ?2",
            params![webhook_id, user_id],
            |r| r.get::<_, i64>(0),
        )
        .unwrap_or(0)
        > 0;
    if !owned {
        return Err(err(Status::NotFound, "webhook not found"));
    }

    let mut stmt = conn
        .prepare(
            "SELECT id, webhook_id, event_type, payload, response_status, response_body, success, error_message, attempt, is_retry, created_at
             FROM webhook_logs WHERE webhook_id = ?1 ORDER BY created_at DESC LIMIT 100",
        )
        .map_err(|e| err(Status::InternalServerError, e.to_string()))?;
    let logs = stmt
        .query_map(params![webhook_id], |row| {
            let payload: String = row.get(3)?;
            Ok(WebhookLog {
                id: row.get(0)?,
                webhook_id: row.get(1)?,
                event_type: row.get(2)?,
                payload: serde_json::from_str(&payload).unwrap_or(serde_json::json!({})),
                response_status: row.get(4)?,
                response_body: row.get(5)?,
                success: row.get::<_, i64>(6)? != 0,
                error_message: row.get(7)?,
                attempt: row.get(8)?,
                is_retry: row.get::<_, i64>(9)? != 0,
                created_at: row.get(10)?,
            })
        })
        .map_err(|e| err(Status::InternalServerError, e.to_string()))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(Json(logs))
}

#[post("/api/webhooks/<user_id>/<webhook_id>/test")]
pub async fn test_webhook(db: &State<Arc<Db>>, webhooks: &State<Arc<WebhookEngine>>, user_id: &str, webhook_id: &str) -> Result<Json<serde_json::Value>, JsonErr> {
    let (session_id, webhook_type): (String, String) = db
        .conn()
        .query_row(
            "SELECT session_id, webhook_type FROM webhooks WHERE id = ?1 AND user_id = ?2",
            params![webhook_id, user_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .map_err(|_| err(Status::NotFound, "webhook not found"))?;

    webhooks
        .fan_out(
            user_id,
            &session_id,
            &webhook_type,
            true,
            serde_json::json!({"event": "test", "synthetic": true}),
        )
        .await;
    Ok(Json(serde_json::json!({"triggered": true})))
}

fn load_webhook(db: &Db, webhook_id: &str) -> Option<Webhook> {
    db.conn()
        .query_row(
            "SELECT id, user_id, session_id, webhook_type, url, success_url, failure_url, custom_payload, headers,
                    max_attempts, retry_delay_secs, retry_on_failure, is_active, total_calls, success_calls, failed_calls,
                    last_called_at, last_success_at, last_failure_at, created_at
             FROM webhooks WHERE id = ?1",
            params![webhook_id],
            crate::webhooks::row_to_webhook,
        )
        .ok()
}

// --- Account strength ---

#[get("/api/account-strength/<user_id>/<session_id>")]
pub fn account_strength(db: &State<Arc<Db>>, user_id: &str, session_id: &str) -> Json<serde_json::Value> {
    let conn = db.conn();
    let sent: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM automation_logs WHERE user_id = ?1 AND session_id = ?2 AND status = 'sent'",
            params![user_id, session_id],
            |r| r.get(0),
        )
        .unwrap_or(0);
    let failed: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM automation_logs WHERE user_id = ?1 AND session_id = ?2 AND status = 'failed'",
            params![user_id, session_id],
            |r| r.get(0),
        )
        .unwrap_or(0);
    let total = sent + failed;
    let score = if total == 0 { 0.0 } else { (sent as f64 / total as f64) * 100.0 };
    Json(serde_json::json!({"session_id": session_id, "score": score, "sent": sent, "failed": failed}))
}

#[get("/api/account-strength/<user_id>/<session_id>/logs")]
pub fn account_strength_logs(db: &State<Arc<Db>>, user_id: &str, session_id: &str) -> Json<Vec<ConnectionEvent>> {
    let conn = db.conn();
    let mut stmt = conn
        .prepare(
            "SELECT id, session_id, event_type, details, created_at FROM connection_events
             WHERE session_id = ?2 AND session_id IN (SELECT id FROM sessions WHERE user_id = ?1)
             ORDER BY created_at DESC LIMIT 100",
        )
        .unwrap();
    let rows = stmt
        .query_map(params![user_id, session_id], |row| {
            let details: String = row.get(3)?;
            Ok(ConnectionEvent {
                id: row.get(0)?,
                session_id: row.get(1)?,
                event_type: row.get(2)?,
                details: serde_json::from_str(&details).unwrap_or(serde_json::json!({})),
                created_at: row.get(4)?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default();
    Json(rows)
}

/// A gated chain of harmless worker activities that updates `last_activity`:
/// fetch profile, mark read, sync contacts, check state, brief idle.
#[post("/api/account-strength/<_user_id>/<session_id>/strengthen-comprehensive")]
pub async fn strengthen_comprehensive(ctx: &State<Arc<AdmissionContext>>, _user_id: &str, session_id: &str) -> Result<Json<serde_json::Value>, JsonErr> {
    let handle = ctx.registry.get(session_id).ok_or_else(|| err(Status::ServiceUnavailable, "session not active"))?;
    if !handle.is_ready() {
        return Err(err(Status::ServiceUnavailable, "session not ready"));
    }

    let worker = (ctx.worker_factory)();
    let _ = worker.fetch_profile().await;
    let _ = worker.sync_contacts().await;
    let _ = worker.query_state().await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    ctx.db
        .conn()
        .execute(
            "UPDATE sessions SET last_activity = ?1 WHERE id = ?2",
            params![chrono::Utc::now().to_rfc3339(), session_id],
        )
        .ok();

    let now = chrono::Utc::now().to_rfc3339();
    ctx.db
        .conn()
        .execute(
            "INSERT INTO automation_logs (id, user_id, session_id, log_type, recipients, message, status, created_at)
             VALUES (?1, ?2, ?3, 'strengthening', '[]', 'strengthen-comprehensive', 'sent', ?4)",
            params![uuid::Uuid::new_v4().to_string(), _user_id, session_id, &now],
        )
        .ok();

    Ok(Json(serde_json::json!({"strengthened": true})))
}

// --- Subscriptions / wallet topup / settings / profile (thin CRUD
// pass-throughs over an external collaborator's tables) ---

#[get("/api/subscriptions/tiers")]
pub fn subscription_tiers() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "basic": {"messages": 1200, "numbers": 1, "validity_days": 30},
        "standard": {"messages": 3000, "numbers": 3, "validity_days": 30},
        "premium": {"messages": null, "numbers": null, "validity_days": null},
    }))
}

#[get("/api/subscriptions/<user_id>")]
pub fn get_subscription(db: &State<Arc<Db>>, user_id: &str) -> Json<Subscription> {
    let conn = db.conn();
    crate::db::ensure_subscription(&conn, user_id);
    conn.query_row(
        "SELECT user_id, tier, messages_used, numbers_used, started_at, expires_at, active FROM subscriptions WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok(Subscription {
                user_id: row.get(0)?,
                tier: row.get(1)?,
                messages_used: row.get(2)?,
                numbers_used: row.get(3)?,
                started_at: row.get(4)?,
                expires_at: row.get(5)?,
                active: row.get::<_, i64>(6)? != 0,
            })
        },
    )
    .map(Json)
    .expect("subscription row was just ensured")
}

#[post("/api/subscriptions/<user_id>", format = "json", data = "<body>")]
pub fn upsert_subscription(db: &State<Arc<Db>>, user_id: &str, body: Json<UpsertSubscriptionRequest>) -> Result<Json<serde_json::Value>, JsonErr> {
    let tier = SubscriptionTier::from_str(&body.tier);
    let now = chrono::Utc::now().to_rfc3339();
    let conn = db.conn();
    crate::db::ensure_subscription(&conn, user_id);
    conn.execute(
        "UPDATE subscriptions SET tier = ?1, started_at = ?2, active = 1 WHERE user_id = ?3",
        params![tier.as_str(), &now, user_id],
    )
    .map_err(|e| err(Status::InternalServerError, e.to_string()))?;
    Ok(Json(serde_json::json!({"user_id": user_id, "tier": tier.as_str()})))
}

#[get("/api/settings/<user_id>")]
pub fn get_settings(db: &State<Arc<Db>>, config: &State<Arc<Config>>, user_id: &str) -> Json<RateLimitSettings> {
    let conn = db.conn();
    crate::db::ensure_rate_limit_settings(&conn, user_id, &config.default_rate_limit);
    conn.query_row(
        "SELECT per_minute, per_hour, per_day FROM rate_limit_settings WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok(RateLimitSettings {
                per_minute: row.get(0)?,
                per_hour: row.get(1)?,
                per_day: row.get(2)?,
            })
        },
    )
    .map(Json)
    .unwrap_or(Json(config.default_rate_limit))
}

#[put("/api/settings/<user_id>", format = "json", data = "<body>")]
pub fn update_settings(db: &State<Arc<Db>>, config: &State<Arc<Config>>, user_id: &str, body: Json<SettingsRequest>) -> Result<Json<RateLimitSettings>, JsonErr> {
    let conn = db.conn();
    crate::db::ensure_rate_limit_settings(&conn, user_id, &config.default_rate_limit);
    let current: RateLimitSettings = conn
        .query_row(
            "SELECT per_minute, per_hour, per_day FROM rate_limit_settings WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(RateLimitSettings {
                    per_minute: row.get(0)?,
                    per_hour: row.get(1)?,
                    per_day: row.get(2)?,
                })
            },
        )
        .unwrap_or(config.default_rate_limit);

    let updated = RateLimitSettings {
        per_minute: body.per_minute.unwrap_or(current.per_minute),
        per_hour: body.per_hour.unwrap_or(current.per_hour),
        per_day: body.per_day.unwrap_or(current.per_day),
    };
    conn.execute(
        "UPDATE rate_limit_settings SET per_minute = ?1, per_hour = ?2, per_day = ?3 WHERE user_id = ?4",
        params![updated.per_minute, updated.per_hour, updated.per_day, user_id],
    )
    .map_err(|e| err(Status::InternalServerError, e.to_string()))?;
    Ok(Json(updated))
}

#[post("/api/users/profile/<user_id>", format = "json", data = "<body>")]
pub fn update_profile(db: &State<Arc<Db>>, user_id: &str, body: Json<ProfileRequest>) -> Json<serde_json::Value> {
    let now = chrono::Utc::now().to_rfc3339();
    db.conn()
        .execute(
            "INSERT INTO user_profiles (user_id, display_name, business_name, timezone, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
               display_name = COALESCE(excluded.display_name, user_profiles.display_name),
               business_name = COALESCE(excluded.business_name, user_profiles.business_name),
               timezone = COALESCE(excluded.timezone, user_profiles.timezone),
               updated_at = excluded.updated_at",
            params![user_id, &body.display_name, &body.business_name, &body.timezone, &now],
        )
        .ok();
    Json(serde_json::json!({"user_id": user_id, "updated_at": now}))
}
