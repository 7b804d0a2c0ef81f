use tokio::sync::broadcast;

/// Gateway-domain events, fanned out to the webhook dispatcher and any other
/// in-process listener: a single broadcast channel carrying one enum of
/// everything interesting that happens in a session's lifecycle.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Otp {
        user_id: String,
        session_id: String,
        recipient: String,
        status: String,
    },
    Announcement {
        user_id: String,
        session_id: String,
        recipients: Vec<String>,
        status: String,
    },
    IncomingText {
        session_id: String,
        from: String,
        body: String,
    },
    IncomingMedia {
        session_id: String,
        from: String,
        media_type: String,
        url: String,
    },
    IncomingLocation {
        session_id: String,
        from: String,
        latitude: f64,
        longitude: f64,
    },
    MessageDelivered {
        session_id: String,
        message_id: String,
        recipient: String,
    },
    MessageRead {
        session_id: String,
        message_id: String,
        recipient: String,
    },
    ConnectionChanged {
        session_id: String,
        event_type: String,
        details: serde_json::Value,
    },
}

pub struct EventBus {
    pub sender: broadcast::Sender<GatewayEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        EventBus { sender }
    }

    pub fn publish(&self, event: GatewayEvent) {
        let _ = self.sender.send(event);
    }
}
