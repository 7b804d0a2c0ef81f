use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::Request;
use serde_json::json;

/// Error taxonomy for the gateway. Each variant renders as a JSON body plus
/// the status code it carries here, collecting the ad hoc `(Status,
/// Json<Value>)` tuple pattern into one reusable type.
#[derive(Debug)]
pub enum AppError {
    SessionNotFound(String),
    /// not-ready / restoring (503) — caller retries after a hint.
    SessionNotReady(String),
    /// session-bad (400) — terminal session state or a session-closed
    /// cascade; caller must reconnect via the dashboard.
    SessionBad(String),
    InvalidRecipient(String),
    SubscriptionLimitExceeded(String),
    /// rate-limit (429) — `reason` is `rate_limit_<window>` per spec §4.G
    /// gate 4; `limit`/`current` are the offending window's configured
    /// limit and observed count at the instant of denial.
    RateLimited {
        reason: String,
        limit: i64,
        current: i64,
        retry_after_secs: u64,
    },
    InsufficientBalance { required: i64, available: i64 },
    Unauthorized,
    Forbidden(String),
    Conflict(String),
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::SessionNotFound(id) => write!(f, "session not found: {id}"),
            AppError::SessionNotReady(reason) => write!(f, "{reason}"),
            AppError::SessionBad(reason) => write!(f, "{reason}"),
            AppError::InvalidRecipient(r) => write!(f, "invalid recipient: {r}"),
            AppError::SubscriptionLimitExceeded(reason) => write!(f, "subscription limit exceeded: {reason}"),
            AppError::RateLimited { reason, limit, current, .. } => {
                write!(f, "rate limited: {reason} (limit {limit}, current {current})")
            }
            AppError::InsufficientBalance { required, available } => {
                write!(f, "insufficient balance: required {required}, available {available}")
            }
            AppError::Unauthorized => write!(f, "unauthorized"),
            AppError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            AppError::Conflict(msg) => write!(f, "conflict: {msg}"),
            AppError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            AppError::NotFound(msg) => write!(f, "not found: {msg}"),
            AppError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    fn status(&self) -> Status {
        match self {
            AppError::SessionNotFound(_) => Status::NotFound,
            AppError::SessionNotReady(_) => Status::ServiceUnavailable,
            AppError::SessionBad(_) => Status::BadRequest,
            AppError::InvalidRecipient(_) => Status::BadRequest,
            AppError::SubscriptionLimitExceeded(_) => Status::Forbidden,
            AppError::RateLimited { .. } => Status::TooManyRequests,
            AppError::InsufficientBalance { .. } => Status::PaymentRequired,
            AppError::Unauthorized => Status::Unauthorized,
            AppError::Forbidden(_) => Status::Forbidden,
            AppError::Conflict(_) => Status::Conflict,
            AppError::BadRequest(_) => Status::BadRequest,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Internal(_) => Status::InternalServerError,
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            AppError::RateLimited { reason, limit, current, retry_after_secs } => json!({
                "error": self.to_string(),
                "reason": reason,
                "limit": limit,
                "current": current,
                "retry_after_secs": retry_after_secs,
            }),
            AppError::InsufficientBalance { required, available } => json!({
                "error": self.to_string(),
                "required": required,
                "available": available,
            }),
            _ => json!({ "error": self.to_string() }),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for AppError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let body = Json(self.body());
        let mut response = Response::build_from(body.respond_to(req)?)
            .status(status)
            .finalize();
        if let AppError::RateLimited { limit, retry_after_secs, .. } = self {
            response.set_header(rocket::http::Header::new("Retry-After", retry_after_secs.to_string()));
            response.set_header(rocket::http::Header::new("X-RateLimit-Limit", limit.to_string()));
            response.set_header(rocket::http::Header::new("X-RateLimit-Remaining", "0"));
        }
        Ok(response)
    }
}

pub type AppResult<T> = Result<T, AppError>;
