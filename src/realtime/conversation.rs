// Conversation identity and the per-conversation message store.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::models::ChatMessage;

/// Key identifying one conversation: either an unordered pair of user ids
/// (private chat) or a group id. The private constructor sorts the pair so
/// the key is the same regardless of which side derives it, and the two
/// variants keep the private and group namespaces disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConversationKey {
    Private(u64, u64),
    Group(u64),
}

impl ConversationKey {
    pub fn private(a: u64, b: u64) -> Self {
        if a <= b {
            ConversationKey::Private(a, b)
        } else {
            ConversationKey::Private(b, a)
        }
    }

    pub fn group(group_id: u64) -> Self {
        ConversationKey::Group(group_id)
    }

    /// Derive a key from whichever identifiers are at hand. A group id wins
    /// over user ids; a private key needs both ends of the pair.
    pub fn resolve(user_a: Option<u64>, user_b: Option<u64>, group_id: Option<u64>) -> Option<Self> {
        match (user_a, user_b, group_id) {
            (_, _, Some(g)) => Some(ConversationKey::group(g)),
            (Some(a), Some(b), None) => Some(ConversationKey::private(a, b)),
            _ => None,
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationKey::Private(a, b) => write!(f, "private_{}_{}", a, b),
            ConversationKey::Group(g) => write!(f, "group_{}", g),
        }
    }
}

/// Append-only buffer of messages per conversation. Reads never allocate or
/// mutate; the only post-append write is stamping `read_at`.
#[derive(Debug, Default)]
pub struct ConversationStore {
    messages: HashMap<ConversationKey, Vec<ChatMessage>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, key: ConversationKey, message: ChatMessage) {
        self.messages.entry(key).or_default().push(message);
    }

    pub fn messages(&self, key: &ConversationKey) -> &[ChatMessage] {
        self.messages.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Stamp `read_at` on every message in the conversation that the current
    /// user sent. The peer acknowledges the conversation as a whole, not
    /// individual messages, so all own messages get the same stamp.
    pub fn stamp_read(&mut self, key: &ConversationKey, read_at: DateTime<Utc>) -> usize {
        let mut stamped = 0;
        if let Some(messages) = self.messages.get_mut(key) {
            for message in messages.iter_mut().filter(|m| m.is_own) {
                message.read_at = Some(read_at);
                stamped += 1;
            }
        }
        stamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender_id: u64, is_own: bool, content: &str) -> ChatMessage {
        ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.to_string(),
            sender_id,
            recipient_id: Some(2),
            group_id: None,
            timestamp: Utc::now(),
            is_own,
            read_at: None,
        }
    }

    #[test]
    fn private_key_is_symmetric() {
        assert_eq!(ConversationKey::private(1, 2), ConversationKey::private(2, 1));
        assert_eq!(ConversationKey::private(1, 2).to_string(), "private_1_2");
        assert_eq!(ConversationKey::private(9, 3).to_string(), "private_3_9");
    }

    #[test]
    fn group_keys_never_collide_with_private_keys() {
        let group = ConversationKey::group(7);
        assert_eq!(group.to_string(), "group_7");
        assert_ne!(group, ConversationKey::private(7, 7));
    }

    #[test]
    fn resolve_prefers_group_and_requires_a_full_pair() {
        assert_eq!(
            ConversationKey::resolve(Some(1), Some(2), Some(7)),
            Some(ConversationKey::group(7))
        );
        assert_eq!(
            ConversationKey::resolve(Some(2), Some(1), None),
            Some(ConversationKey::private(1, 2))
        );
        assert_eq!(ConversationKey::resolve(Some(1), None, None), None);
        assert_eq!(ConversationKey::resolve(None, None, None), None);
    }

    #[test]
    fn reads_on_missing_conversation_return_empty() {
        let store = ConversationStore::new();
        assert!(store.messages(&ConversationKey::private(1, 2)).is_empty());
    }

    #[test]
    fn append_preserves_order() {
        let mut store = ConversationStore::new();
        let key = ConversationKey::private(1, 2);
        store.append(key, message(2, false, "first"));
        store.append(key, message(2, false, "second"));
        let stored = store.messages(&key);
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].content, "first");
        assert_eq!(stored[1].content, "second");
    }

    #[test]
    fn stamp_read_touches_only_own_messages() {
        let mut store = ConversationStore::new();
        let key = ConversationKey::private(1, 2);
        store.append(key, message(1, true, "mine"));
        store.append(key, message(2, false, "theirs"));
        store.append(key, message(1, true, "mine again"));

        let read_at = Utc::now();
        assert_eq!(store.stamp_read(&key, read_at), 2);

        let stored = store.messages(&key);
        assert_eq!(stored[0].read_at, Some(read_at));
        assert_eq!(stored[1].read_at, None);
        assert_eq!(stored[2].read_at, Some(read_at));
    }
}
