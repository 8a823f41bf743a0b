// Re-export needed modules for testing
pub mod models;
pub mod realtime;

// Re-export main types for convenience
pub use models::*;
pub use realtime::{ClientConfig, ConversationKey, RealtimeClient};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_connection_status_defaults() {
        let status = ConnectionStatus::default();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(status.error.is_none());
        assert_eq!(status.reconnect_attempts, 0);
        assert!(!status.is_connected());
    }

    #[test]
    fn test_chat_message_creation() {
        let now = Utc::now();
        let msg = ChatMessage {
            id: "msg123".to_string(),
            content: "Hello, world!".to_string(),
            sender_id: 7,
            recipient_id: Some(12),
            group_id: None,
            timestamp: now,
            is_own: false,
            read_at: None,
        };

        assert_eq!(msg.id, "msg123");
        assert_eq!(msg.sender_id, 7);
        assert_eq!(msg.recipient_id, Some(12));
        assert_eq!(msg.content, "Hello, world!");
        assert_eq!(msg.timestamp, now);
        assert!(msg.read_at.is_none());

        // A group message carries a group id instead of a recipient
        let group_msg = ChatMessage {
            id: "msg456".to_string(),
            content: "Hello, group!".to_string(),
            sender_id: 7,
            recipient_id: None,
            group_id: Some(3),
            timestamp: now,
            is_own: true,
            read_at: None,
        };
        assert_eq!(group_msg.group_id, Some(3));
        assert!(group_msg.is_own);
    }

    #[test]
    fn test_notification_deserialization() {
        let json = r#"{
            "id": 11,
            "type": "friend_request",
            "title": "New friend request",
            "message": "maya wants to connect",
            "from_user": 23
        }"#;
        let notification: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(notification.id, 11);
        assert_eq!(notification.kind, "friend_request");
        assert_eq!(notification.from_user, Some(23));
        assert!(notification.related_id.is_none());
    }

    #[test]
    fn test_conversation_key_reexport() {
        // The derivation helper is part of the public surface
        assert_eq!(
            ConversationKey::private(8, 2),
            ConversationKey::private(2, 8)
        );
    }
}
