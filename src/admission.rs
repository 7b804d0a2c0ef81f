use std::sync::Arc;
use std::time::Duration;

use rusqlite::params;

use crate::browser_worker::BrowserWorker;
use crate::db::Db;
use crate::error::AppError;
use crate::models::{AutomationLogType, SendResult, SubscriptionCheck, SubscriptionTier};
use crate::registry::SessionRegistry;
use crate::send_executor::{self, SendAttempt};
use crate::session_storage::SessionStorageService;
use crate::supervisor::{self, SendError};
use crate::wallet::{self, WalletLocks};

/// IQD cost per outbound message.
pub const MESSAGE_COST: i64 = 10;

/// Everything the admission pipeline needs to run a gate stack, bundled so
/// route handlers pass one value instead of five.
pub struct AdmissionContext {
    pub db: Arc<Db>,
    pub events: Arc<crate::events::EventBus>,
    pub registry: Arc<SessionRegistry>,
    pub storage: Arc<SessionStorageService>,
    pub wallet_locks: Arc<WalletLocks>,
    pub auth_root: String,
    pub initial_wallet_balance: i64,
    pub default_rate_limit: crate::models::RateLimitSettings,
    pub webhooks: Arc<crate::webhooks::WebhookEngine>,
    pub worker_factory: Box<dyn Fn() -> Arc<dyn BrowserWorker> + Send + Sync>,
}

pub struct SingleSendOutcome {
    pub message_id: String,
    pub balance_after: i64,
}

/// Run the full gate stack for one outbound message. Returns the
/// structured reason of whichever gate fails first; no wallet or counter
/// mutation occurs before the failing gate.
pub async fn admit_single(
    ctx: &AdmissionContext,
    user_id: &str,
    session_id: &str,
    recipient_raw: &str,
    body: &str,
    log_type: AutomationLogType,
    otp_code: Option<&str>,
) -> Result<SingleSendOutcome, AppError> {
    ensure_ready(ctx, user_id, session_id).await?;

    let recipient = send_executor::normalize_recipient(recipient_raw)
        .ok_or_else(|| AppError::InvalidRecipient(recipient_raw.to_string()))?;

    {
        let conn = ctx.db.conn();
        let check = check_subscription(&conn, user_id, 1, 0);
        if !check.allowed {
            return Err(AppError::SubscriptionLimitExceeded(check.reason.unwrap_or_default()));
        }
        crate::db::ensure_rate_limit_settings(&conn, user_id, &ctx.default_rate_limit);
        let settings = load_rate_limit_settings(&conn, user_id);
        let info = crate::rate_limit::check_rate_limit(&conn, user_id, &settings);
        if !info.allowed {
            return Err(AppError::RateLimited {
                reason: format!("rate_limit_{}", info.window),
                limit: info.limit,
                current: info.current,
                retry_after_secs: info.retry_after_secs,
            });
        }
    }

    let lock = ctx.wallet_locks.for_user(user_id);
    let _guard = lock.lock().await;

    let debit_txn = {
        let mut conn = ctx.db.conn();
        wallet::debit(
            &mut conn,
            user_id,
            Some(session_id),
            MESSAGE_COST,
            "outbound message",
            None,
            ctx.initial_wallet_balance,
        )?
    };

    let outcome = send_executor::send_one(&ctx.registry, session_id, &recipient, body).await;
    send_executor::log_single(&ctx.db, user_id, session_id, log_type, &recipient, body, &outcome);

    if log_type == AutomationLogType::Otp {
        let (event_type, success, error) = match &outcome {
            Ok(_) => ("otp_sent", true, None),
            Err(e) => ("otp_failed", false, Some(send_executor::send_error_reason(e))),
        };
        let mut payload = serde_json::json!({
            "event": event_type,
            "success": success,
            "recipient": recipient,
            "code": otp_code,
        });
        if let Some(err) = error {
            payload["error"] = serde_json::Value::String(err);
        }
        ctx.webhooks.fan_out(user_id, session_id, event_type, success, payload).await;
    }

    match outcome {
        Ok(sent) => {
            increment_subscription_usage(&ctx.db.conn(), user_id, 1);
            Ok(SingleSendOutcome {
                message_id: sent.message_id,
                balance_after: debit_txn.balance_after,
            })
        }
        Err(err) => {
            let mut conn = ctx.db.conn();
            wallet::credit(
                &mut conn,
                user_id,
                Some(session_id),
                MESSAGE_COST,
                &format!("refund: {}", send_executor::send_error_reason(&err)),
                Some(&format!("refund_{}", debit_txn.id)),
                ctx.initial_wallet_balance,
            )?;
            Err(classify_send_error(err))
        }
    }
}

pub struct BulkSendOutcome {
    pub results: Vec<SendResult>,
    pub sent: usize,
    pub failed: usize,
}

/// Bulk variant: debits the full cost upfront, refunds `cost * failed` at
/// the end as a single credit (upfront-debit-and-refund is canonical —
/// see DESIGN.md).
pub async fn admit_bulk(
    ctx: &AdmissionContext,
    user_id: &str,
    session_id: &str,
    recipients_raw: &[String],
    body: &str,
) -> Result<BulkSendOutcome, AppError> {
    ensure_ready(ctx, user_id, session_id).await?;

    let mut recipients = Vec::with_capacity(recipients_raw.len());
    for raw in recipients_raw {
        let normalized = send_executor::normalize_recipient(raw).ok_or_else(|| AppError::InvalidRecipient(raw.clone()))?;
        recipients.push(normalized);
    }

    let count = recipients.len() as i64;
    {
        let conn = ctx.db.conn();
        let check = check_subscription(&conn, user_id, count, 0);
        if !check.allowed {
            return Err(AppError::SubscriptionLimitExceeded(check.reason.unwrap_or_default()));
        }
        let settings = load_rate_limit_settings(&conn, user_id);
        let info = crate::rate_limit::check_rate_limit(&conn, user_id, &settings);
        if !info.allowed {
            return Err(AppError::RateLimited {
                reason: format!("rate_limit_{}", info.window),
                limit: info.limit,
                current: info.current,
                retry_after_secs: info.retry_after_secs,
            });
        }
    }

    let total_cost = MESSAGE_COST * count;
    let lock = ctx.wallet_locks.for_user(user_id);
    let _guard = lock.lock().await;

    let debit_txn = {
        let mut conn = ctx.db.conn();
        wallet::debit(
            &mut conn,
            user_id,
            Some(session_id),
            total_cost,
            "bulk outbound send",
            None,
            ctx.initial_wallet_balance,
        )?
    };

    let attempts: Vec<SendAttempt> = send_executor::send_bulk(&ctx.registry, session_id, &recipients, body).await;
    send_executor::log_bulk(&ctx.db, user_id, session_id, &recipients, body, &attempts);

    let sent = attempts.iter().filter(|a| a.outcome.is_ok()).count();
    let failed = attempts.len() - sent;
    let refund_amount = MESSAGE_COST * (failed as i64);

    if refund_amount > 0 {
        let mut conn = ctx.db.conn();
        wallet::credit(
            &mut conn,
            user_id,
            Some(session_id),
            refund_amount,
            "refund: bulk send partial failure",
            Some(&format!("refund_{}", debit_txn.id)),
            ctx.initial_wallet_balance,
        )?;
    }
    if sent > 0 {
        increment_subscription_usage(&ctx.db.conn(), user_id, sent as i64);
    }

    let errors: Vec<serde_json::Value> = attempts
        .iter()
        .filter_map(|a| {
            a.outcome
                .as_ref()
                .err()
                .map(|e| serde_json::json!({"recipient": a.recipient, "error": send_executor::send_error_reason(e)}))
        })
        .collect();
    ctx.webhooks
        .fan_out(
            user_id,
            session_id,
            "announcement_sent",
            failed == 0,
            serde_json::json!({
                "event": "announcement_sent",
                "sent": sent,
                "failed": failed,
                "recipients": recipients,
                "errors": errors,
            }),
        )
        .await;

    let results = attempts
        .into_iter()
        .map(|a| match a.outcome {
            Ok(sent) => SendResult {
                recipient: a.recipient,
                status: "sent".to_string(),
                message_id: Some(sent.message_id),
                error: None,
            },
            Err(err) => SendResult {
                recipient: a.recipient,
                status: "failed".to_string(),
                message_id: None,
                error: Some(send_executor::send_error_reason(&err)),
            },
        })
        .collect();

    Ok(BulkSendOutcome { results, sent, failed })
}

fn classify_send_error(err: SendError) -> AppError {
    match err {
        SendError::NotReady => AppError::SessionNotReady("not-ready".to_string()),
        SendError::UnreachableRecipient => AppError::InvalidRecipient("unreachable-recipient".to_string()),
        SendError::SessionClosed => AppError::SessionBad("session-closed".to_string()),
        SendError::SendFailed(reason) => AppError::Internal(reason),
    }
}

/// Gate 1: session presence and readiness, with on-demand restoration and a
/// 15 s / 500 ms poll.
async fn ensure_ready(ctx: &AdmissionContext, user_id: &str, session_id: &str) -> Result<(), AppError> {
    let row_status: Option<String> = ctx
        .db
        .conn()
        .query_row("SELECT status FROM sessions WHERE id = ?1", params![session_id], |r| r.get(0))
        .ok();

    let row_status = match row_status {
        Some(s) => s,
        None => return Err(AppError::NotFound(format!("session {session_id}"))),
    };
    let status = crate::models::SessionStatus::from_str(&row_status);
    if status.is_terminal() {
        return Err(AppError::SessionBad("session-bad".to_string()));
    }

    let handle = match ctx.registry.get(session_id) {
        Some(h) => h,
        None if status == crate::models::SessionStatus::Connected => {
            let worker = (ctx.worker_factory)();
            let registry = ctx.registry.clone();
            ctx.registry.create_if_absent(session_id, || {
                supervisor::spawn(
                    session_id.to_string(),
                    user_id.to_string(),
                    ctx.db.clone(),
                    ctx.events.clone(),
                    ctx.storage.clone(),
                    worker,
                    ctx.auth_root.clone(),
                    registry,
                )
            })
        }
        None => return Err(AppError::SessionNotReady("initializing".to_string())),
    };

    if handle.is_ready() {
        return Ok(());
    }

    for _ in 0..30 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        if handle.is_ready() {
            return Ok(());
        }
    }

    Err(AppError::SessionNotReady("service-unavailable".to_string()))
}

fn load_rate_limit_settings(conn: &rusqlite::Connection, user_id: &str) -> crate::models::RateLimitSettings {
    conn.query_row(
        "SELECT per_minute, per_hour, per_day FROM rate_limit_settings WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok(crate::models::RateLimitSettings {
                per_minute: row.get(0)?,
                per_hour: row.get(1)?,
                per_day: row.get(2)?,
            })
        },
    )
    .unwrap_or_default()
}

/// Checks a user's subscription tier against its message/number quotas,
/// implemented locally since this crate owns its own row store.
fn check_subscription(conn: &rusqlite::Connection, user_id: &str, messages_needed: i64, numbers_needed: i64) -> SubscriptionCheck {
    crate::db::ensure_subscription(conn, user_id);

    let row = conn.query_row(
        "SELECT tier, messages_used, numbers_used, expires_at, active FROM subscriptions WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, i64>(4)? != 0,
            ))
        },
    );

    let (tier_str, messages_used, numbers_used, expires_at, active) = match row {
        Ok(v) => v,
        Err(_) => {
            return SubscriptionCheck {
                allowed: false,
                reason: Some("no_subscription".to_string()),
            }
        }
    };

    if !active {
        return SubscriptionCheck {
            allowed: false,
            reason: Some("subscription_inactive".to_string()),
        };
    }

    let tier = SubscriptionTier::from_str(&tier_str);
    if tier != SubscriptionTier::Premium {
        if let Some(expires_at) = expires_at {
            if let Ok(expiry) = chrono::DateTime::parse_from_rfc3339(&expires_at) {
                if expiry < chrono::Utc::now() {
                    return SubscriptionCheck {
                        allowed: false,
                        reason: Some("subscription_expired".to_string()),
                    };
                }
            }
        }
    }

    let (message_limit, number_limit, _validity_days) = tier.limits();
    if let Some(limit) = message_limit {
        if messages_used + messages_needed > limit {
            return SubscriptionCheck {
                allowed: false,
                reason: Some("message_quota_exceeded".to_string()),
            };
        }
    }
    if let Some(limit) = number_limit {
        if numbers_used + numbers_needed > limit {
            return SubscriptionCheck {
                allowed: false,
                reason: Some("number_quota_exceeded".to_string()),
            };
        }
    }

    SubscriptionCheck { allowed: true, reason: None }
}

/// `messages_used` only ever increases; premium never enforces a limit
/// but its usage is still tracked for reporting.
fn increment_subscription_usage(conn: &rusqlite::Connection, user_id: &str, count: i64) {
    conn.execute(
        "UPDATE subscriptions SET messages_used = messages_used + ?1 WHERE user_id = ?2",
        params![count, user_id],
    )
    .ok();
}
