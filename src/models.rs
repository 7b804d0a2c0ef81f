use serde::{Deserialize, Serialize};

// --- Sessions ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initializing,
    QrPending,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::QrPending => "qr_pending",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "qr_pending" => SessionStatus::QrPending,
            "connecting" => SessionStatus::Connecting,
            "connected" => SessionStatus::Connected,
            "disconnected" => SessionStatus::Disconnected,
            "failed" => SessionStatus::Failed,
            _ => SessionStatus::Initializing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Disconnected | SessionStatus::Failed)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    pub last_activity: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub user_id: String,
    pub session_id: String,
}

// --- API Keys ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiKey {
    pub key: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub user_id: String,
    pub session_id: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    pub usage_count: i64,
    pub created_at: String,
}

// --- Wallet ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WalletTxnType {
    Initial,
    Debit,
    Credit,
}

impl WalletTxnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletTxnType::Initial => "initial",
            WalletTxnType::Debit => "debit",
            WalletTxnType::Credit => "credit",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Wallet {
    pub user_id: String,
    pub balance: i64,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WalletTransaction {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub txn_type: String,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub created_at: String,
}

// --- Subscriptions ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Basic,
    Standard,
    Premium,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Standard => "standard",
            SubscriptionTier::Premium => "premium",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "standard" => SubscriptionTier::Standard,
            "premium" => SubscriptionTier::Premium,
            _ => SubscriptionTier::Basic,
        }
    }

    /// (message limit, number limit, validity days). `None` = unlimited/never expires.
    pub fn limits(&self) -> (Option<i64>, Option<i64>, Option<i64>) {
        match self {
            SubscriptionTier::Basic => (Some(1200), Some(1), Some(30)),
            SubscriptionTier::Standard => (Some(3000), Some(3), Some(30)),
            SubscriptionTier::Premium => (None, None, None),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Subscription {
    pub user_id: String,
    pub tier: String,
    pub messages_used: i64,
    pub numbers_used: i64,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    pub active: bool,
}

/// Outcome of the subscription admission check.
#[derive(Debug, Clone)]
pub struct SubscriptionCheck {
    pub allowed: bool,
    /// e.g. "message_quota_exceeded", "number_quota_exceeded", "no_subscription"
    pub reason: Option<String>,
}

// --- Rate limit settings ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct RateLimitSettings {
    pub per_minute: i64,
    pub per_hour: i64,
    pub per_day: i64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            per_minute: 10,
            per_hour: 100,
            per_day: 1000,
        }
    }
}

// --- Automation log ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AutomationLogType {
    Otp,
    Announcement,
    ApiMessage,
    Strengthening,
}

impl AutomationLogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationLogType::Otp => "otp",
            AutomationLogType::Announcement => "announcement",
            AutomationLogType::ApiMessage => "api_message",
            AutomationLogType::Strengthening => "strengthening",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AutomationLog {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub log_type: String,
    pub recipients: String, // JSON array, even for single-recipient sends
    pub message: String,
    pub status: String, // sent | failed | partial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: String,
}

// --- Webhooks ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    Otp,
    Announcement,
    IncomingText,
    IncomingMedia,
    IncomingLocation,
    IncomingMessage,
    MessageDelivered,
    MessageRead,
    All,
}

impl WebhookEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventType::Otp => "otp",
            WebhookEventType::Announcement => "announcement",
            WebhookEventType::IncomingText => "incoming_text",
            WebhookEventType::IncomingMedia => "incoming_media",
            WebhookEventType::IncomingLocation => "incoming_location",
            WebhookEventType::IncomingMessage => "incoming_message",
            WebhookEventType::MessageDelivered => "message_delivered",
            WebhookEventType::MessageRead => "message_read",
            WebhookEventType::All => "all",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "otp" => WebhookEventType::Otp,
            "announcement" => WebhookEventType::Announcement,
            "incoming_text" => WebhookEventType::IncomingText,
            "incoming_media" => WebhookEventType::IncomingMedia,
            "incoming_location" => WebhookEventType::IncomingLocation,
            "incoming_message" => WebhookEventType::IncomingMessage,
            "message_delivered" => WebhookEventType::MessageDelivered,
            "message_read" => WebhookEventType::MessageRead,
            "all" => WebhookEventType::All,
            _ => return None,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Webhook {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub webhook_type: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_url: Option<String>,
    pub custom_payload: serde_json::Value,
    pub headers: serde_json::Value,
    pub max_attempts: i64,
    pub retry_delay_secs: i64,
    pub retry_on_failure: bool,
    pub is_active: bool,
    pub total_calls: i64,
    pub success_calls: i64,
    pub failed_calls: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_called_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateWebhook {
    pub session_id: String,
    pub webhook_type: String,
    pub url: String,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub failure_url: Option<String>,
    #[serde(default)]
    pub custom_payload: Option<serde_json::Value>,
    #[serde(default)]
    pub headers: Option<serde_json::Value>,
    #[serde(default)]
    pub max_attempts: Option<i64>,
    #[serde(default)]
    pub retry_delay_secs: Option<i64>,
    #[serde(default = "default_true")]
    pub retry_on_failure: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UpdateWebhook {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub failure_url: Option<String>,
    #[serde(default)]
    pub custom_payload: Option<serde_json::Value>,
    #[serde(default)]
    pub headers: Option<serde_json::Value>,
    #[serde(default)]
    pub max_attempts: Option<i64>,
    #[serde(default)]
    pub retry_delay_secs: Option<i64>,
    #[serde(default)]
    pub retry_on_failure: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WebhookLog {
    pub id: String,
    pub webhook_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub attempt: i64,
    pub is_retry: bool,
    pub created_at: String,
}

// --- Message delivery tracking ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageDeliveryTracking {
    pub message_id: String,
    pub session_id: String,
    pub recipient: String,
    pub status: String, // sent | delivered | read
    pub sent_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<String>,
}

// --- Connection events ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionEventType {
    Connected,
    Disconnected,
    Reconnecting,
    Error,
}

impl ConnectionEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionEventType::Connected => "connected",
            ConnectionEventType::Disconnected => "disconnected",
            ConnectionEventType::Reconnecting => "reconnecting",
            ConnectionEventType::Error => "error",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectionEvent {
    pub id: String,
    pub session_id: String,
    pub event_type: String,
    pub details: serde_json::Value,
    pub created_at: String,
}

// --- Send requests ---

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub recipient: String,
    pub code: String,
    #[serde(default = "default_lang")]
    pub language: String,
}

fn default_lang() -> String {
    "ar".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SendAnnouncementRequest {
    pub recipients: Vec<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub recipient: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendResult {
    pub recipient: String,
    pub status: String, // sent | failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkSendResponse {
    pub sent: usize,
    pub failed: usize,
    pub results: Vec<SendResult>,
}

// --- Thin CRUD request bodies ---

#[derive(Debug, Deserialize)]
pub struct UpsertSubscriptionRequest {
    pub tier: String,
}

#[derive(Debug, Deserialize)]
pub struct TopupRequest {
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    pub per_minute: Option<i64>,
    pub per_hour: Option<i64>,
    pub per_day: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}
