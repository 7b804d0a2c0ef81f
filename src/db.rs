use rusqlite::{params, Connection};
use std::sync::Mutex;

pub struct Db {
    conn: Mutex<Connection>,
}

/// Generate an API key: `wass_` + URL-safe base64 of 32 random bytes (≥32
/// bytes of entropy per the auth-key-uniqueness property).
pub fn generate_api_key() -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("wass_{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate an independent API secret alongside a key.
pub fn generate_api_secret() -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl Db {
    pub fn new(path: &str) -> Self {
        let conn = Connection::open(path).expect("Failed to open database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("Failed to set pragmas");
        let db = Db {
            conn: Mutex::new(conn),
        };
        db.migrate();
        db
    }

    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                phone_number TEXT,
                status TEXT NOT NULL DEFAULT 'initializing',
                qr_code TEXT,
                last_activity TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);

            CREATE TABLE IF NOT EXISTS api_keys (
                key TEXT PRIMARY KEY,
                secret TEXT NOT NULL DEFAULT '',
                user_id TEXT NOT NULL,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                active INTEGER NOT NULL DEFAULT 1,
                last_used_at TEXT,
                usage_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_api_keys_session ON api_keys(session_id);
            CREATE INDEX IF NOT EXISTS idx_api_keys_user ON api_keys(user_id);

            CREATE TABLE IF NOT EXISTS wallets (
                user_id TEXT PRIMARY KEY,
                balance INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS wallet_transactions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES wallets(user_id) ON DELETE CASCADE,
                session_id TEXT,
                txn_type TEXT NOT NULL,
                amount INTEGER NOT NULL,
                balance_before INTEGER NOT NULL,
                balance_after INTEGER NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                reference_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_wallet_txn_user ON wallet_transactions(user_id, created_at);

            CREATE TABLE IF NOT EXISTS subscriptions (
                user_id TEXT PRIMARY KEY,
                tier TEXT NOT NULL DEFAULT 'basic',
                messages_used INTEGER NOT NULL DEFAULT 0,
                numbers_used INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                expires_at TEXT,
                active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS rate_limit_settings (
                user_id TEXT PRIMARY KEY,
                per_minute INTEGER NOT NULL DEFAULT 10,
                per_hour INTEGER NOT NULL DEFAULT 100,
                per_day INTEGER NOT NULL DEFAULT 1000
            );

            CREATE TABLE IF NOT EXISTS automation_logs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                log_type TEXT NOT NULL,
                recipients TEXT NOT NULL DEFAULT '[]',
                message TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                error_message TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_automation_logs_user_time ON automation_logs(user_id, created_at);

            CREATE TABLE IF NOT EXISTS webhooks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                webhook_type TEXT NOT NULL,
                url TEXT NOT NULL,
                success_url TEXT,
                failure_url TEXT,
                custom_payload TEXT NOT NULL DEFAULT '{}',
                headers TEXT NOT NULL DEFAULT '{}',
                max_attempts INTEGER NOT NULL DEFAULT 3,
                retry_delay_secs INTEGER NOT NULL DEFAULT 30,
                retry_on_failure INTEGER NOT NULL DEFAULT 1,
                is_active INTEGER NOT NULL DEFAULT 1,
                total_calls INTEGER NOT NULL DEFAULT 0,
                success_calls INTEGER NOT NULL DEFAULT 0,
                failed_calls INTEGER NOT NULL DEFAULT 0,
                last_called_at TEXT,
                last_success_at TEXT,
                last_failure_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_webhooks_user ON webhooks(user_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_webhooks_session_type ON webhooks(user_id, session_id, webhook_type);

            CREATE TABLE IF NOT EXISTS webhook_logs (
                id TEXT PRIMARY KEY,
                webhook_id TEXT NOT NULL REFERENCES webhooks(id) ON DELETE CASCADE,
                event_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                response_status INTEGER,
                response_body TEXT,
                success INTEGER NOT NULL,
                error_message TEXT,
                attempt INTEGER NOT NULL DEFAULT 1,
                is_retry INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_webhook_logs_webhook ON webhook_logs(webhook_id, created_at);

            CREATE TABLE IF NOT EXISTS message_delivery_tracking (
                message_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                recipient TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'sent',
                sent_at TEXT NOT NULL,
                delivered_at TEXT,
                read_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_delivery_session ON message_delivery_tracking(session_id);

            CREATE TABLE IF NOT EXISTS connection_events (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                event_type TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_connection_events_session ON connection_events(session_id, created_at);

            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id TEXT PRIMARY KEY,
                display_name TEXT,
                business_name TEXT,
                timezone TEXT,
                updated_at TEXT NOT NULL
            );
            ",
        )
        .expect("Failed to run migrations");

        // Idempotent additive migrations: `.ok()` swallows "duplicate column".
        conn.execute_batch("ALTER TABLE sessions ADD COLUMN phone_number TEXT;")
            .ok();
        conn.execute_batch("ALTER TABLE subscriptions ADD COLUMN numbers_used INTEGER NOT NULL DEFAULT 0;")
            .ok();
        conn.execute_batch("ALTER TABLE api_keys ADD COLUMN secret TEXT NOT NULL DEFAULT '';")
            .ok();
    }
}

/// Ensure a wallet row exists for a user, seeded with `initial_balance` on
/// first touch. `INSERT OR IGNORE` makes this idempotent against a
/// concurrent first-touch from another task.
pub fn ensure_wallet(conn: &Connection, user_id: &str, initial_balance: i64) {
    let now = chrono::Utc::now().to_rfc3339();
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO wallets (user_id, balance, updated_at) VALUES (?1, ?2, ?3)",
            params![user_id, initial_balance, &now],
        )
        .unwrap_or(0);
    if inserted > 0 {
        conn.execute(
            "INSERT INTO wallet_transactions (id, user_id, session_id, txn_type, amount, balance_before, balance_after, description, reference_id, created_at)
             VALUES (?1, ?2, NULL, 'initial', ?3, 0, ?3, 'initial wallet balance', NULL, ?4)",
            params![uuid::Uuid::new_v4().to_string(), user_id, initial_balance, &now],
        )
        .ok();
    }
}

/// Ensure a subscription row exists for a user, defaulting to the basic tier.
pub fn ensure_subscription(conn: &Connection, user_id: &str) {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR IGNORE INTO subscriptions (user_id, tier, messages_used, numbers_used, started_at, active)
         VALUES (?1, 'basic', 0, 0, ?2, 1)",
        params![user_id, &now],
    )
    .ok();
}

/// Ensure a rate-limit settings row exists for a user, seeded from the configured default.
pub fn ensure_rate_limit_settings(conn: &Connection, user_id: &str, defaults: &crate::models::RateLimitSettings) {
    conn.execute(
        "INSERT OR IGNORE INTO rate_limit_settings (user_id, per_minute, per_hour, per_day) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, defaults.per_minute, defaults.per_hour, defaults.per_day],
    )
    .ok();
}
