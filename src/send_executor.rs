use rusqlite::params;

use crate::db::Db;
use crate::models::AutomationLogType;
use crate::registry::SessionRegistry;
use crate::supervisor::{SendEnvelope, SendError, SendOutcome};

/// Canonicalize a phone number to international digits-only form: strip a
/// leading `+` and any non-digit characters, then require 9–15 digits. The
/// same rule serves both the admission gate and the executor's
/// pre-resolution canonicalization.
pub fn normalize_recipient(raw: &str) -> Option<String> {
    let stripped: String = raw.trim().trim_start_matches('+').chars().filter(|c| c.is_ascii_digit()).collect();
    if stripped.len() >= 9 && stripped.len() <= 15 {
        Some(stripped)
    } else {
        None
    }
}

/// Fixed short OTP template, Arabic default. Only the code and the
/// 5-minute validity clause are interpolated.
pub fn otp_message(code: &str, language: &str) -> String {
    match language {
        "en" => format!("Your verification code is {code}. It is valid for 5 minutes."),
        _ => format!("رمز التحقق الخاص بك هو {code}. صالح لمدة 5 دقائق."),
    }
}

pub struct SendAttempt {
    pub recipient: String,
    pub outcome: Result<SendOutcome, SendError>,
}

/// Dispatch one message through the session's supervisor. Readiness,
/// resolution, dispatch, and error classification all live on the
/// supervisor side, since the supervisor exclusively owns the worker
/// handle.
pub async fn send_one(registry: &SessionRegistry, session_id: &str, recipient_digits: &str, body: &str) -> Result<SendOutcome, SendError> {
    let handle = registry.get(session_id).ok_or(SendError::NotReady)?;
    handle
        .send(SendEnvelope {
            recipient_digits: recipient_digits.to_string(),
            body: body.to_string(),
        })
        .await
}

/// Sequential bulk send: re-checks readiness between each recipient so a
/// mid-batch disconnect stops further attempts. Stops early on
/// `SessionClosed` or on the supervisor disappearing entirely.
pub async fn send_bulk(registry: &SessionRegistry, session_id: &str, recipients: &[String], body: &str) -> Vec<SendAttempt> {
    let mut results = Vec::with_capacity(recipients.len());
    for recipient in recipients {
        let handle = match registry.get(session_id) {
            Some(h) => h,
            None => {
                results.push(SendAttempt {
                    recipient: recipient.clone(),
                    outcome: Err(SendError::NotReady),
                });
                break;
            }
        };
        if !handle.is_ready() {
            results.push(SendAttempt {
                recipient: recipient.clone(),
                outcome: Err(SendError::NotReady),
            });
            break;
        }

        let outcome = handle
            .send(SendEnvelope {
                recipient_digits: recipient.clone(),
                body: body.to_string(),
            })
            .await;
        let stop = matches!(outcome, Err(SendError::SessionClosed));
        results.push(SendAttempt {
            recipient: recipient.clone(),
            outcome,
        });
        if stop {
            break;
        }
    }
    results
}

pub fn send_error_reason(err: &SendError) -> String {
    match err {
        SendError::NotReady => "not-ready".to_string(),
        SendError::UnreachableRecipient => "unreachable-recipient".to_string(),
        SendError::SessionClosed => "session-closed".to_string(),
        SendError::SendFailed(reason) => reason.clone(),
    }
}

/// Append one automation-log row for a single-recipient send.
pub fn log_single(db: &Db, user_id: &str, session_id: &str, log_type: AutomationLogType, recipient: &str, message: &str, outcome: &Result<SendOutcome, SendError>) {
    let (status, error_message) = match outcome {
        Ok(_) => ("sent".to_string(), None),
        Err(e) => ("failed".to_string(), Some(send_error_reason(e))),
    };
    let now = chrono::Utc::now().to_rfc3339();
    db.conn()
        .execute(
            "INSERT INTO automation_logs (id, user_id, session_id, log_type, recipients, message, status, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                uuid::Uuid::new_v4().to_string(),
                user_id,
                session_id,
                log_type.as_str(),
                serde_json::json!([recipient]).to_string(),
                message,
                &status,
                &error_message,
                &now,
            ],
        )
        .ok();
}

/// Append one automation-log row for the whole bulk request: one row
/// captures the whole send with `recipients` serialized as a JSON array
/// and a JSON `error_message` list of per-recipient failures.
pub fn log_bulk(db: &Db, user_id: &str, session_id: &str, recipients: &[String], message: &str, attempts: &[SendAttempt]) {
    let sent = attempts.iter().filter(|a| a.outcome.is_ok()).count();
    let failed = attempts.len() - sent;
    let status = if failed == 0 {
        "sent"
    } else if sent == 0 {
        "failed"
    } else {
        "partial"
    };

    let errors: Vec<serde_json::Value> = attempts
        .iter()
        .filter_map(|a| a.outcome.as_ref().err().map(|e| serde_json::json!({"recipient": a.recipient, "error": send_error_reason(e)})))
        .collect();

    let now = chrono::Utc::now().to_rfc3339();
    db.conn()
        .execute(
            "INSERT INTO automation_logs (id, user_id, session_id, log_type, recipients, message, status, error_message, created_at)
             VALUES (?1, ?2, ?3, 'announcement', ?4, ?5, ?6, ?7, ?8)",
            params![
                uuid::Uuid::new_v4().to_string(),
                user_id,
                session_id,
                serde_json::to_string(recipients).unwrap_or_default(),
                message,
                status,
                serde_json::to_string(&errors).unwrap_or_default(),
                &now,
            ],
        )
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_recipient_strips_plus_and_punctuation() {
        assert_eq!(normalize_recipient("+964 750 123 4567"), Some("9647501234567".to_string()));
        assert_eq!(normalize_recipient("964-750-123-4567"), Some("9647501234567".to_string()));
    }

    #[test]
    fn normalize_recipient_rejects_out_of_range_lengths() {
        assert_eq!(normalize_recipient("12345"), None); // too short
        assert_eq!(normalize_recipient("1".repeat(20).as_str()), None); // too long
    }

    #[test]
    fn otp_message_defaults_to_arabic() {
        let msg = otp_message("1234", "fr");
        assert!(msg.contains("1234"));
        assert!(msg.contains("صالح"));
    }

    #[test]
    fn otp_message_switches_to_english() {
        let msg = otp_message("1234", "en");
        assert_eq!(msg, "Your verification code is 1234. It is valid for 5 minutes.");
    }
}
