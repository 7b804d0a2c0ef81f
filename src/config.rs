use std::env;

/// Consolidated environment configuration, read once at startup via
/// `Config::from_env()` rather than scattering `env::var` calls across the
/// object store, browser worker, and wallet/rate-limit call sites.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub static_dir: String,
    pub object_store_url: Option<String>,
    pub object_store_key: Option<String>,
    pub object_store_bucket: String,
    pub session_auth_dir: String,
    pub client_url: String,
    pub default_rate_limit: crate::models::RateLimitSettings,
    pub initial_wallet_balance: i64,
    pub webhook_timeout_secs: u64,
    pub webhook_max_concurrency: usize,
    pub webhook_default_max_attempts: i64,
    pub webhook_default_retry_delay_secs: u64,
    /// Optional path to the browser binary the automation worker would launch.
    /// When unset, a fixed list of Linux paths is searched.
    pub browser_binary_path: Option<String>,
}

/// Fixed Linux search list for the browser binary when `BROWSER_BINARY_PATH`
/// is unset.
pub const BROWSER_BINARY_SEARCH_PATHS: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/snap/bin/chromium",
];

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "data/gateway.db".to_string()),
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "frontend/dist".to_string()),
            object_store_url: env::var("OBJECT_STORE_URL").ok(),
            object_store_key: env::var("OBJECT_STORE_KEY").ok(),
            object_store_bucket: env::var("OBJECT_STORE_BUCKET").unwrap_or_else(|_| "whatsapp-sessions".to_string()),
            session_auth_dir: env::var("SESSION_AUTH_DIR").unwrap_or_else(|_| "data/auth".to_string()),
            client_url: env::var("CLIENT_URL").unwrap_or_else(|_| "*".to_string()),
            default_rate_limit: crate::models::RateLimitSettings {
                per_minute: env_i64("RATE_LIMIT_PER_MINUTE", 10),
                per_hour: env_i64("RATE_LIMIT_PER_HOUR", 100),
                per_day: env_i64("RATE_LIMIT_PER_DAY", 1000),
            },
            initial_wallet_balance: env_i64("INITIAL_WALLET_BALANCE", 1000),
            webhook_timeout_secs: env_i64("WEBHOOK_TIMEOUT_SECS", 10) as u64,
            webhook_max_concurrency: env_i64("WEBHOOK_MAX_CONCURRENCY", 16) as usize,
            webhook_default_max_attempts: env_i64("WEBHOOK_DEFAULT_MAX_ATTEMPTS", 3),
            webhook_default_retry_delay_secs: env_i64("WEBHOOK_DEFAULT_RETRY_DELAY_SECS", 5) as u64,
            browser_binary_path: env::var("BROWSER_BINARY_PATH").ok(),
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
