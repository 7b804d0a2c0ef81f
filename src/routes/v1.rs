use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{get, post, State};
use rusqlite::params;

use super::{api_key_error_response, ApiKeyAuth, ApiKeyAuthError};
use crate::admission::{self, AdmissionContext};
use crate::db::Db;
use crate::error::AppError;
use crate::models::*;

type JsonErr = (rocket::http::Status, Json<serde_json::Value>);

/// `/api/v1/auth/info` — echoes the (user, session) an API key is bound to,
/// so an external integrator can confirm which key it is holding.
#[get("/api/v1/auth/info")]
pub fn auth_info(auth: Result<ApiKeyAuth, ApiKeyAuthError>) -> Result<Json<serde_json::Value>, JsonErr> {
    let auth = auth.map_err(|e| api_key_error_response(&e))?;
    Ok(Json(serde_json::json!({
        "user_id": auth.user_id,
        "session_id": auth.session_id,
    })))
}

#[get("/api/v1/session/status")]
pub fn session_status(db: &State<Arc<Db>>, auth: Result<ApiKeyAuth, ApiKeyAuthError>) -> Result<Json<Session>, JsonErr> {
    let auth = auth.map_err(|e| api_key_error_response(&e))?;
    db.conn()
        .query_row(
            "SELECT id, user_id, phone_number, status, qr_code, last_activity, created_at FROM sessions WHERE id = ?1",
            params![&auth.session_id],
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
        .map(Json)
        .map_err(|_| (rocket::http::Status::NotFound, Json(serde_json::json!({"error": "session not found"}))))
}

#[get("/api/v1/wallet/balance")]
pub fn v1_wallet_balance(
    db: &State<Arc<Db>>,
    config: &State<Arc<crate::config::Config>>,
    auth: Result<ApiKeyAuth, ApiKeyAuthError>,
) -> Result<Json<Wallet>, JsonErr> {
    let auth = auth.map_err(|e| api_key_error_response(&e))?;
    let conn = db.conn();
    Ok(Json(crate::wallet::get_or_create_wallet(&conn, &auth.user_id, config.initial_wallet_balance)))
}

#[get("/api/v1/wallet/transactions")]
pub fn v1_wallet_transactions(db: &State<Arc<Db>>, auth: Result<ApiKeyAuth, ApiKeyAuthError>) -> Result<Json<Vec<WalletTransaction>>, JsonErr> {
    let auth = auth.map_err(|e| api_key_error_response(&e))?;
    Ok(Json(crate::wallet::list_transactions(&db.conn(), &auth.user_id, 100)))
}

#[post("/api/v1/messages/send", format = "json", data = "<body>")]
pub async fn messages_send(
    ctx: &State<Arc<AdmissionContext>>,
    auth: Result<ApiKeyAuth, ApiKeyAuthError>,
    body: Json<SendMessageRequest>,
) -> Result<Json<serde_json::Value>, V1Error> {
    let auth = auth.map_err(V1Error::from)?;
    let outcome = admission::admit_single(
        ctx,
        &auth.user_id,
        &auth.session_id,
        &body.recipient,
        &body.message,
        AutomationLogType::ApiMessage,
        None,
    )
    .await
    .map_err(V1Error::App)?;
    Ok(Json(serde_json::json!({
        "status": "sent",
        "message_id": outcome.message_id,
        "balance_after": outcome.balance_after,
    })))
}

#[post("/api/v1/messages/send-bulk", format = "json", data = "<body>")]
pub async fn messages_send_bulk(
    ctx: &State<Arc<AdmissionContext>>,
    auth: Result<ApiKeyAuth, ApiKeyAuthError>,
    body: Json<SendAnnouncementRequest>,
) -> Result<Json<BulkSendResponse>, V1Error> {
    let auth = auth.map_err(V1Error::from)?;
    let outcome = admission::admit_bulk(ctx, &auth.user_id, &auth.session_id, &body.recipients, &body.message)
        .await
        .map_err(V1Error::App)?;
    Ok(Json(BulkSendResponse {
        sent: outcome.sent,
        failed: outcome.failed,
        results: outcome.results,
    }))
}

#[post("/api/v1/otp/send", format = "json", data = "<body>")]
pub async fn otp_send(
    ctx: &State<Arc<AdmissionContext>>,
    auth: Result<ApiKeyAuth, ApiKeyAuthError>,
    body: Json<SendOtpRequest>,
) -> Result<Json<serde_json::Value>, V1Error> {
    let auth = auth.map_err(V1Error::from)?;
    let text = crate::send_executor::otp_message(&body.code, &body.language);
    let outcome = admission::admit_single(
        ctx,
        &auth.user_id,
        &auth.session_id,
        &body.recipient,
        &text,
        AutomationLogType::Otp,
        Some(&body.code),
    )
    .await
    .map_err(V1Error::App)?;
    Ok(Json(serde_json::json!({
        "status": "sent",
        "message_id": outcome.message_id,
        "balance_after": outcome.balance_after,
    })))
}

/// Unifies the two error sources a v1 send handler can hit — a failed
/// `ApiKeyAuth` guard or a failed admission gate — behind one `Responder`.
#[derive(rocket::response::Responder)]
pub enum V1Error {
    Auth(JsonErr),
    App(AppError),
}

impl From<ApiKeyAuthError> for V1Error {
    fn from(e: ApiKeyAuthError) -> Self {
        V1Error::Auth(api_key_error_response(&e))
    }
}
