use rusqlite::{params, Connection};

use crate::models::RateLimitSettings;

/// Outcome of a rate-limit check against a user's per-minute/hour/day
/// automation log volume. `window`/`limit`/`current` identify the
/// narrowest exhausted window (or, when allowed, the minute window) so
/// callers can report `reason=rate_limit_<window>` per the admission gate.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub allowed: bool,
    pub window: &'static str,
    pub limit: i64,
    pub current: i64,
    pub remaining: i64,
    pub retry_after_secs: u64,
}

/// Check a user's automation-log volume against their configured per-minute/
/// per-hour/per-day windows. Returns the first window that is exhausted,
/// narrowest first, since a minute limit hitting first gives the caller the
/// tightest `Retry-After`.
pub fn check_rate_limit(conn: &Connection, user_id: &str, settings: &RateLimitSettings) -> RateLimitInfo {
    let windows: [(&str, &str, i64, i64); 3] = [
        ("minute", "-1 minute", settings.per_minute, 60),
        ("hour", "-1 hour", settings.per_hour, 3600),
        ("day", "-1 day", settings.per_day, 86400),
    ];

    for (name, sqlite_offset, limit, window_secs) in windows {
        if limit <= 0 {
            continue; // 0 or negative means unlimited for that window
        }
        let count: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM automation_logs WHERE user_id = ?1 AND created_at > datetime('now', '{sqlite_offset}')"
                ),
                params![user_id],
                |r| r.get(0),
            )
            .unwrap_or(0);

        if count >= limit {
            return RateLimitInfo {
                allowed: false,
                window: name,
                limit,
                current: count,
                remaining: 0,
                retry_after_secs: window_secs as u64,
            };
        }
    }

    let per_minute = settings.per_minute;
    let used_this_minute: i64 = if per_minute > 0 {
        conn.query_row(
            "SELECT COUNT(*) FROM automation_logs WHERE user_id = ?1 AND created_at > datetime('now', '-1 minute')",
            params![user_id],
            |r| r.get(0),
        )
        .unwrap_or(0)
    } else {
        0
    };

    RateLimitInfo {
        allowed: true,
        window: "minute",
        limit: per_minute,
        current: used_this_minute,
        remaining: (per_minute - used_this_minute).max(0),
        retry_after_secs: 0,
    }
}
