use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single chat message, private or group, as held in the conversation store.
///
/// Messages are append-only: once stored, only `read_at` is ever written
/// again, when the peer acknowledges reading the conversation.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub sender_id: u64,
    /// Peer user id for private messages, `None` for group messages.
    pub recipient_id: Option<u64>,
    /// Group id for group messages, `None` for private messages.
    pub group_id: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub is_own: bool,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect attempts exhausted. Only an explicit `connect()` call
    /// leaves this state.
    Failed,
}

/// Connection lifecycle snapshot exposed to the presentation layer.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub error: Option<String>,
    pub reconnect_attempts: u32,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        ConnectionStatus {
            state: ConnectionState::Disconnected,
            error: None,
            reconnect_attempts: 0,
        }
    }
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// A server-pushed notification event, forwarded verbatim to the embedding
/// application. The realtime core does not interpret these beyond delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub related_id: Option<u64>,
    #[serde(default)]
    pub related_type: Option<String>,
    #[serde(default)]
    pub from_user: Option<u64>,
}
