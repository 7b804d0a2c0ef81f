// Route module decomposition, per-domain split: dashboard endpoints
// (user-id scoped) in one module, the API-key family in another,
// health/catchers in a third.

mod dashboard;
mod system;
mod v1;

pub use dashboard::{
    account_strength, account_strength_logs, connect, create_webhook, delete_webhook, disconnect,
    get_session, get_settings, get_subscription, list_webhooks, send_announcement, send_otp,
    strengthen_comprehensive, subscription_tiers, test_message, test_webhook, topup_wallet,
    update_profile, update_settings, update_webhook, upsert_subscription, wallet_balance,
    wallet_transactions, webhook_logs,
};
pub use system::{health, not_found, too_many_requests};
pub use v1::{auth_info, messages_send, messages_send_bulk, otp_send, session_status, v1_wallet_balance, v1_wallet_transactions};

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::Json;
use rusqlite::params;

use crate::db::Db;

/// API-key family auth: `X-API-Key` (case-insensitive) or
/// `Authorization: Bearer <key>`. A hit annotates the request with the
/// bound (user, session) and stamps `last_used_at`/`usage_count`.
pub struct ApiKeyAuth {
    pub key: String,
    pub user_id: String,
    pub session_id: String,
}

#[derive(Debug)]
pub enum ApiKeyAuthError {
    Missing,
    Invalid,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ApiKeyAuth {
    type Error = ApiKeyAuthError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let key = req
            .headers()
            .get_one("X-API-Key")
            .map(str::to_string)
            .or_else(|| {
                req.headers()
                    .get_one("Authorization")
                    .and_then(|auth| auth.strip_prefix("Bearer "))
                    .map(str::to_string)
            });

        let key = match key {
            Some(k) if !k.is_empty() => k,
            _ => return Outcome::Error((Status::Unauthorized, ApiKeyAuthError::Missing)),
        };

        let db = match req.rocket().state::<std::sync::Arc<Db>>() {
            Some(db) => db,
            None => return Outcome::Error((Status::InternalServerError, ApiKeyAuthError::Invalid)),
        };

        let row: Option<(String, String)> = db
            .conn()
            .query_row(
                "SELECT user_id, session_id FROM api_keys WHERE key = ?1 AND active = 1",
                params![&key],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .ok();

        match row {
            Some((user_id, session_id)) => {
                let now = chrono::Utc::now().to_rfc3339();
                db.conn()
                    .execute(
                        "UPDATE api_keys SET last_used_at = ?1, usage_count = usage_count + 1 WHERE key = ?2",
                        params![&now, &key],
                    )
                    .ok();
                Outcome::Success(ApiKeyAuth { key, user_id, session_id })
            }
            None => Outcome::Error((Status::Unauthorized, ApiKeyAuthError::Invalid)),
        }
    }
}

pub fn api_key_error_response(err: &ApiKeyAuthError) -> (Status, Json<serde_json::Value>) {
    match err {
        ApiKeyAuthError::Missing => (Status::Unauthorized, Json(serde_json::json!({"error": "API key is required"}))),
        ApiKeyAuthError::Invalid => (Status::Unauthorized, Json(serde_json::json!({"error": "Invalid API key"}))),
    }
}
