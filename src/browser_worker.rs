use async_trait::async_trait;
use tokio::sync::mpsc;

/// Events a browser worker surfaces to its owning supervisor. Mirrors the
/// worker's own lifecycle vocabulary rather than the supervisor's session
/// state machine; the supervisor is what translates these into state
/// transitions.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Qr(String),
    Authenticated,
    Ready,
    AuthFailure(String),
    Disconnected(String),
    Message(IncomingMessage),
    MessageAck { message_id: String, ack: u8 },
}

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub from: String,
    pub body: String,
    pub kind: String, // text | media | location
    pub media_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_broadcast: bool,
}

/// Opaque adapter over the WhatsApp-web automation client, an external
/// collaborator out of scope for this crate. This crate only needs the
/// trait boundary and one concrete, deterministic implementation a
/// production build would swap for a real adapter behind.
#[async_trait]
pub trait BrowserWorker: Send + Sync {
    /// Start initialization in the background; events arrive on the
    /// returned channel. `auth_path` is the session's local auth directory.
    async fn init(&self, auth_path: &str) -> mpsc::Receiver<WorkerEvent>;

    /// Resolve normalized digits to the worker's internal chat id. Returns
    /// `None` on a resolution miss (unreachable recipient).
    async fn resolve_number(&self, digits: &str) -> Result<Option<String>, String>;

    /// Send a text payload to a resolved chat id. Returns an opaque message
    /// id on success.
    async fn send_text(&self, chat_id: &str, body: &str) -> Result<String, String>;

    /// True iff the worker reports a non-empty identity and its page (if
    /// inspectable) is open.
    async fn query_state(&self) -> WorkerState;

    async fn fetch_profile(&self) -> Result<(), String>;
    async fn mark_chat_read(&self, chat_id: &str) -> Result<(), String>;
    async fn sync_contacts(&self) -> Result<(), String>;
}

#[derive(Debug, Clone, Default)]
pub struct WorkerState {
    pub has_identity: bool,
    pub phone_number: Option<String>,
    pub page_closed: bool,
}

impl WorkerState {
    pub fn is_ready(&self) -> bool {
        self.has_identity && !self.page_closed
    }
}

/// Deterministic stand-in for the real automation client: authenticates
/// immediately without ever emitting a QR challenge, resolves any
/// well-formed digit string to a synthetic chat id, and "sends" by just
/// minting a message id. Used wherever this crate needs a `BrowserWorker`
/// and no real automation library is wired in.
pub struct SimulatedWorker {
    phone_number: String,
}

impl SimulatedWorker {
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
        }
    }
}

#[async_trait]
impl BrowserWorker for SimulatedWorker {
    async fn init(&self, _auth_path: &str) -> mpsc::Receiver<WorkerEvent> {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let _ = tx.send(WorkerEvent::Authenticated).await;
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            let _ = tx.send(WorkerEvent::Ready).await;
        });
        rx
    }

    async fn resolve_number(&self, digits: &str) -> Result<Option<String>, String> {
        if digits.len() < 9 {
            return Ok(None);
        }
        Ok(Some(format!("{digits}@c.us")))
    }

    async fn send_text(&self, _chat_id: &str, _body: &str) -> Result<String, String> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn query_state(&self) -> WorkerState {
        WorkerState {
            has_identity: true,
            phone_number: Some(self.phone_number.clone()),
            page_closed: false,
        }
    }

    async fn fetch_profile(&self) -> Result<(), String> {
        Ok(())
    }

    async fn mark_chat_read(&self, _chat_id: &str) -> Result<(), String> {
        Ok(())
    }

    async fn sync_contacts(&self) -> Result<(), String> {
        Ok(())
    }
}
