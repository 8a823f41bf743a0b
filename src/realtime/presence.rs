// Presence tracking: the set of user ids currently online, as reported by
// the server's single-user and bulk-snapshot presence frames.

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct PresenceSet {
    online: HashSet<u64>,
}

impl PresenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the user was not previously known to be online.
    pub fn set_online(&mut self, user_id: u64) -> bool {
        self.online.insert(user_id)
    }

    pub fn set_offline(&mut self, user_id: u64) -> bool {
        self.online.remove(&user_id)
    }

    /// Replace the whole set from a server snapshot, sent on (re)connect.
    pub fn replace(&mut self, user_ids: Vec<u64>) {
        self.online = user_ids.into_iter().collect();
    }

    pub fn is_online(&self, user_id: u64) -> bool {
        self.online.contains(&user_id)
    }

    pub fn online_users(&self) -> Vec<u64> {
        let mut users: Vec<u64> = self.online.iter().copied().collect();
        users.sort_unstable();
        users
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}
