use std::collections::{HashMap, HashSet};

use crate::route::ConversationKey;

/// Sub-store for per-conversation unread message ids.
///
/// Purely derived state: counts come from id-set cardinality, never from
/// rescanning buckets. The active conversation's set is always empty.
pub struct UnreadStore {
    unread_ids: HashMap<ConversationKey, HashSet<String>>,
    active: ConversationKey,
}

impl UnreadStore {
    pub fn new() -> Self {
        Self {
            unread_ids: HashMap::new(),
            active: ConversationKey::Broadcast,
        }
    }

    // ===== Getters =====

    pub fn active(&self) -> &ConversationKey {
        &self.active
    }

    pub fn count(&self, key: &ConversationKey) -> usize {
        self.unread_ids.get(key).map(HashSet::len).unwrap_or(0)
    }

    // ===== Mutations =====

    /// Record an ingested message. Returns true when the id was newly
    /// marked unread.
    pub fn on_ingested(&mut self, key: &ConversationKey, id: &str, is_from_other: bool) -> bool {
        if !is_from_other || *key == self.active {
            return false;
        }
        self.unread_ids
            .entry(key.clone())
            .or_default()
            .insert(id.to_string())
    }

    /// Switch the active conversation, clearing its unread set. Idempotent.
    pub fn on_activate(&mut self, key: &ConversationKey) {
        self.active = key.clone();
        if let Some(ids) = self.unread_ids.get_mut(key) {
            ids.clear();
        }
    }

    /// Drop a single id, e.g. when its message is deleted.
    pub fn forget(&mut self, key: &ConversationKey, id: &str) {
        if let Some(ids) = self.unread_ids.get_mut(key) {
            ids.remove(id);
        }
    }
}

impl Default for UnreadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lunch() -> ConversationKey {
        ConversationKey::Group("lunch".to_string())
    }

    #[test]
    fn counts_grow_monotonically_while_inactive() {
        let mut unread = UnreadStore::new();
        assert!(unread.on_ingested(&lunch(), "1", true));
        assert!(unread.on_ingested(&lunch(), "2", true));
        // Re-ingesting the same id is not a new unread
        assert!(!unread.on_ingested(&lunch(), "2", true));
        assert_eq!(unread.count(&lunch()), 2);
    }

    #[test]
    fn activation_clears_to_zero_and_is_idempotent() {
        let mut unread = UnreadStore::new();
        unread.on_ingested(&lunch(), "1", true);
        unread.on_ingested(&lunch(), "2", true);

        unread.on_activate(&lunch());
        assert_eq!(unread.count(&lunch()), 0);
        unread.on_activate(&lunch());
        assert_eq!(unread.count(&lunch()), 0);
    }

    #[test]
    fn active_conversation_never_accumulates_unread() {
        let mut unread = UnreadStore::new();
        unread.on_activate(&lunch());
        assert!(!unread.on_ingested(&lunch(), "1", true));
        assert_eq!(unread.count(&lunch()), 0);

        // Broadcast is no longer active, so it does accumulate
        assert!(unread.on_ingested(&ConversationKey::Broadcast, "2", true));
        assert_eq!(unread.count(&ConversationKey::Broadcast), 1);
    }

    #[test]
    fn own_messages_are_never_unread() {
        let mut unread = UnreadStore::new();
        assert!(!unread.on_ingested(&lunch(), "1", false));
        assert_eq!(unread.count(&lunch()), 0);
    }

    #[test]
    fn forget_drops_single_ids() {
        let mut unread = UnreadStore::new();
        unread.on_ingested(&lunch(), "1", true);
        unread.on_ingested(&lunch(), "2", true);
        unread.forget(&lunch(), "1");
        assert_eq!(unread.count(&lunch()), 1);
    }
}
