// Wire protocol for the realtime socket: JSON frames with a "type"
// discriminator. Consumed and produced kinds are separate enums so the
// dispatcher can match exhaustively over exactly what the server sends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Notification;

/// Frames received from the server.
///
/// Kinds added server-side after this client shipped land in `Unknown`
/// and are logged and dropped rather than crashing the dispatcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    PrivateMessage {
        from: u64,
        to: u64,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
        #[serde(default)]
        data: Option<MessagePayload>,
    },
    GroupMessage {
        from: u64,
        group_id: u64,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
        #[serde(default)]
        data: Option<MessagePayload>,
    },
    Typing {
        from: u64,
        #[serde(default)]
        to: Option<u64>,
        #[serde(default)]
        group_id: Option<u64>,
        data: TypingPayload,
    },
    ReadStatus {
        from: u64,
        to: u64,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
        #[serde(default)]
        data: Option<ReadStatusPayload>,
    },
    UserOnline {
        data: UserPayload,
    },
    UserOffline {
        data: UserPayload,
    },
    UserList {
        data: UserListPayload,
    },
    Notification {
        data: Notification,
    },
    Error {
        #[serde(default)]
        content: Option<String>,
    },
    Ping,
    Pong,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypingPayload {
    pub is_typing: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadStatusPayload {
    #[serde(default)]
    pub read_by: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    pub user_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserListPayload {
    pub online_users: Vec<u64>,
}

/// Frames this client sends. The timestamp is stamped when the frame is
/// created, so a frame queued while offline carries its original send time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    PrivateMessage {
        to: u64,
        content: String,
        timestamp: DateTime<Utc>,
    },
    GroupMessage {
        group_id: u64,
        content: String,
        timestamp: DateTime<Utc>,
    },
    Typing {
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        group_id: Option<u64>,
        data: TypingRequest,
        timestamp: DateTime<Utc>,
    },
    ReadStatus {
        to: u64,
        timestamp: DateTime<Utc>,
    },
    Ping {
        timestamp: DateTime<Utc>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypingRequest {
    pub is_typing: bool,
}
