// Ephemeral typing indicators with timeout-based expiry.
//
// Each (conversation, user) pair holds at most one live timer. A repeated
// "is typing" event cancels the pending timer and starts a fresh one, so
// the indicator stays up as long as events keep arriving and falls off
// on its own when they stop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::warn;
use tokio::task::JoinHandle;

use super::conversation::ConversationKey;

pub const TYPING_EXPIRY: Duration = Duration::from_secs(3);

struct TypingEntry {
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Clone)]
pub struct TypingTracker {
    entries: Arc<Mutex<HashMap<(ConversationKey, u64), TypingEntry>>>,
    generations: Arc<AtomicU64>,
    expiry: Duration,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::with_expiry(TYPING_EXPIRY)
    }

    pub fn with_expiry(expiry: Duration) -> Self {
        TypingTracker {
            entries: Arc::new(Mutex::new(HashMap::new())),
            generations: Arc::new(AtomicU64::new(0)),
            expiry,
        }
    }

    /// Record that `user_id` started typing in `key`. Cancels any pending
    /// expiry for the same pair before arming a new one, so two events in
    /// quick succession leave exactly one live timer.
    pub fn started(&self, key: ConversationKey, user_id: u64) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let entries = Arc::clone(&self.entries);
        let expiry = self.expiry;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            if let Ok(mut entries) = entries.lock() {
                // Only remove the entry this timer was armed for; a newer
                // generation means the indicator was refreshed meanwhile.
                if entries
                    .get(&(key, user_id))
                    .is_some_and(|entry| entry.generation == generation)
                {
                    entries.remove(&(key, user_id));
                }
            }
        });

        match self.entries.lock() {
            Ok(mut entries) => {
                if let Some(previous) = entries.insert((key, user_id), TypingEntry { generation, timer }) {
                    previous.timer.abort();
                }
            }
            Err(_) => {
                warn!("typing state lock poisoned, dropping indicator for {}", key);
                timer.abort();
            }
        }
    }

    /// Record that `user_id` explicitly stopped typing in `key`.
    pub fn stopped(&self, key: ConversationKey, user_id: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(entry) = entries.remove(&(key, user_id)) {
                entry.timer.abort();
            }
        }
    }

    pub fn typing_users(&self, key: &ConversationKey) -> Vec<u64> {
        match self.entries.lock() {
            Ok(entries) => {
                let mut users: Vec<u64> = entries
                    .keys()
                    .filter(|(entry_key, _)| entry_key == key)
                    .map(|(_, user_id)| *user_id)
                    .collect();
                users.sort_unstable();
                users
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn is_typing(&self, key: &ConversationKey, user_id: u64) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(&(*key, user_id)))
            .unwrap_or(false)
    }

    /// Cancel every live timer. Called on disconnect and teardown so no
    /// expiry fires against state that is going away.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            for (_, entry) in entries.drain() {
                entry.timer.abort();
            }
        }
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new()
    }
}
