use std::collections::HashSet;

use tracing::{debug, warn};

use crate::constants::{BROADCAST_KEY, GROUP_PREFIX};
use crate::error::CoreError;
use crate::events::CoreEvent;
use crate::models::{
    next_provisional_id, now_millis, IdentitySnapshot, Message, MessageBody, MessageRecord,
};
use crate::route::{route, ConversationKey};
use crate::store::conversation_store::ConversationStore;
use crate::store::unread_store::UnreadStore;

/// Single source of truth for the session: conversation buckets, unread
/// state and the identity snapshot. Owned by the runtime; frontends reach
/// it only through these methods and the drained `CoreEvent`s.
pub struct ChatStore {
    conversations: ConversationStore,
    unread: UnreadStore,
    identity: IdentitySnapshot,
    /// Poll targets that have completed at least one fetch.
    initial_sync_done: HashSet<String>,
    pending_events: Vec<CoreEvent>,
}

impl ChatStore {
    pub fn new(username: &str, match_window_ms: u64) -> Self {
        Self {
            conversations: ConversationStore::new(match_window_ms),
            unread: UnreadStore::new(),
            identity: IdentitySnapshot::new(username),
            initial_sync_done: HashSet::new(),
            pending_events: Vec::new(),
        }
    }

    // ===== Getters =====

    pub fn identity(&self) -> &IdentitySnapshot {
        &self.identity
    }

    pub fn messages_of(&self, key: &ConversationKey) -> &[Message] {
        self.conversations.messages_of(key)
    }

    pub fn unread_count_of(&self, key: &ConversationKey) -> usize {
        self.unread.count(key)
    }

    pub fn active_key(&self) -> &ConversationKey {
        self.unread.active()
    }

    pub fn conversation_keys(&self) -> Vec<ConversationKey> {
        self.conversations.keys()
    }

    pub fn is_initial_synced(&self, target: &str) -> bool {
        self.initial_sync_done.contains(target)
    }

    pub fn drain_events(&mut self) -> Vec<CoreEvent> {
        std::mem::take(&mut self.pending_events)
    }

    // ===== Ingestion =====

    /// Apply a complete server listing for one poll target: ingest every
    /// record, then propagate remote deletions for buckets the listing is
    /// authoritative for.
    pub fn apply_listing(&mut self, target: &str, records: &[MessageRecord]) {
        for record in records {
            self.ingest_record(record);
        }

        // A broadcast or group listing covers its whole bucket; a direct
        // bucket merges two listings, so deletions cannot be inferred.
        let key = ConversationKey::parse(target);
        if !key.is_direct() {
            let listed: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
            let removed = self.conversations.retain_confirmed(&key, &listed);
            if !removed.is_empty() {
                for id in &removed {
                    self.unread.forget(&key, id);
                }
                self.push_updated(key);
            }
        }

        self.initial_sync_done.insert(target.to_string());
    }

    /// Route and reconcile one authoritative record.
    pub fn ingest_record(&mut self, record: &MessageRecord) {
        let Some(message) = Message::from_record(record) else {
            warn!("dropping malformed message record id={}", record.id);
            return;
        };
        if !self.is_relevant(&message) {
            debug!("dropping message {} outside this session's view", message.id);
            return;
        }

        let key = route(&message, &self.identity.username);
        let is_from_other = self.is_from_other(&message, &key);
        let id = message.id.clone();

        let outcome = self.conversations.ingest(&key, message);
        if let Some(old_id) = outcome.promoted_from {
            self.pending_events.push(CoreEvent::Promoted {
                key: key.clone(),
                old_id,
                new_id: id.clone(),
            });
        }
        if outcome.newly_inserted {
            self.unread.on_ingested(&key, &id, is_from_other);
        }
        if outcome.changed {
            self.push_updated(key);
        }
    }

    pub fn set_identity(&mut self, snapshot: IdentitySnapshot) {
        if snapshot == self.identity {
            return;
        }
        self.identity = snapshot;
        self.pending_events.push(CoreEvent::IdentityChanged);
    }

    // ===== Local actions =====

    /// Validate a composed message and append it optimistically. The
    /// caller forwards the returned provisional message to the worker.
    pub fn begin_send(
        &mut self,
        to: &str,
        input: &str,
        reply_to: Option<String>,
    ) -> Result<Message, CoreError> {
        if to.is_empty() {
            return Err(CoreError::validation("missing send target"));
        }
        let key = ConversationKey::parse(to);
        match &key {
            ConversationKey::Direct(peer) => {
                if *peer == self.identity.username {
                    return Err(CoreError::validation("cannot message yourself"));
                }
                if !self.identity.is_friend(peer) {
                    return Err(CoreError::validation(
                        "you can only message accepted friends",
                    ));
                }
            }
            ConversationKey::Group(name) => {
                if !self.identity.is_member(name) {
                    return Err(CoreError::validation("you are not a member of this group"));
                }
            }
            ConversationKey::Broadcast => {}
        }

        let body = MessageBody::from_input(input)?;
        let now = now_millis();
        let message = Message {
            id: next_provisional_id(now),
            from: self.identity.username.clone(),
            to: to.to_string(),
            body,
            reply_to,
            timestamp: now,
        };
        self.conversations.append_provisional(&key, message.clone());
        self.push_updated(key);
        Ok(message)
    }

    /// Roll back an optimistic entry whose create call failed.
    pub fn fail_send(&mut self, provisional_id: &str) {
        if let Some((key, _)) = self.conversations.remove_by_id(provisional_id) {
            self.pending_events.push(CoreEvent::SendFailed {
                key: key.clone(),
                provisional_id: provisional_id.to_string(),
            });
            self.push_updated(key);
        }
    }

    /// Remove a message locally. The caller decides whether the removal
    /// also needs a server delete (it does iff the entry was confirmed).
    pub fn delete_message(&mut self, key: &ConversationKey, id: &str) -> Option<Message> {
        let removed = self.conversations.remove(key, id)?;
        self.unread.forget(key, id);
        self.push_updated(key.clone());
        Some(removed)
    }

    pub fn activate(&mut self, key: ConversationKey) {
        self.unread.on_activate(&key);
        self.push_updated(key);
    }

    // ===== Internal =====

    fn is_relevant(&self, message: &Message) -> bool {
        if let Some(name) = message.to.strip_prefix(GROUP_PREFIX) {
            return self.identity.is_member(name);
        }
        if message.to == BROADCAST_KEY {
            return true;
        }
        // A direct message must involve this session
        message.from == self.identity.username || message.to == self.identity.username
    }

    fn is_from_other(&self, message: &Message, key: &ConversationKey) -> bool {
        let me = &self.identity.username;
        match key {
            ConversationKey::Broadcast | ConversationKey::Group(_) => message.from != *me,
            ConversationKey::Direct(_) => message.to == *me && message.from != *me,
        }
    }

    fn push_updated(&mut self, key: ConversationKey) {
        let event = CoreEvent::Updated(key);
        if !self.pending_events.contains(&event) {
            self.pending_events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MATCH_WINDOW_MS;

    fn store() -> ChatStore {
        let mut store = ChatStore::new("alice", MATCH_WINDOW_MS);
        store.set_identity(IdentitySnapshot {
            username: "alice".to_string(),
            friends: ["bob".to_string()].into_iter().collect(),
            groups: ["lunch".to_string()].into_iter().collect(),
        });
        store.drain_events();
        store
    }

    fn record(id: &str, from: &str, to: &str, text: &str, ts: u64) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            from_user: from.to_string(),
            to_target: to.to_string(),
            text: Some(text.to_string()),
            file_url: None,
            file_name: None,
            reply_to: None,
            timestamp: ts,
        }
    }

    #[test]
    fn broadcast_unread_respects_the_active_conversation() {
        let mut store = store();
        // Broadcast is active by default: no unread
        store.ingest_record(&record("1", "carol", "all", "hey", 1000));
        assert_eq!(store.unread_count_of(&ConversationKey::Broadcast), 0);

        store.activate(ConversationKey::Direct("bob".to_string()));
        store.ingest_record(&record("2", "carol", "all", "again", 2000));
        assert_eq!(store.unread_count_of(&ConversationKey::Broadcast), 1);

        store.activate(ConversationKey::Broadcast);
        assert_eq!(store.unread_count_of(&ConversationKey::Broadcast), 0);
    }

    #[test]
    fn third_party_direct_messages_are_dropped() {
        let mut store = store();
        store.ingest_record(&record("1", "carol", "dave", "psst", 1000));
        assert!(store.conversation_keys().is_empty());
    }

    #[test]
    fn group_messages_require_membership() {
        let mut store = store();
        store.ingest_record(&record("1", "carol", "group:ops", "hi", 1000));
        assert!(store.conversation_keys().is_empty());

        store.ingest_record(&record("2", "carol", "group:lunch", "hi", 1000));
        let key = ConversationKey::Group("lunch".to_string());
        assert_eq!(store.messages_of(&key).len(), 1);
    }

    #[test]
    fn send_validation_gates_on_identity() {
        let mut store = store();
        assert!(matches!(
            store.begin_send("carol", "hi", None),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            store.begin_send("group:ops", "hi", None),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            store.begin_send("alice", "hi", None),
            Err(CoreError::Validation(_))
        ));
        assert!(store.begin_send("bob", "hi", None).is_ok());
        assert!(store.begin_send("group:lunch", "hi", None).is_ok());
        assert!(store.begin_send("all", "hi", None).is_ok());
    }

    #[test]
    fn optimistic_send_then_promotion() {
        let mut store = store();
        let provisional = store.begin_send("bob", "hi", None).unwrap();
        let key = ConversationKey::Direct("bob".to_string());
        assert_eq!(store.messages_of(&key).len(), 1);
        assert!(store.messages_of(&key)[0].is_provisional());
        store.drain_events();

        let confirmed = record("42", "alice", "bob", "hi", provisional.timestamp + 5);
        store.ingest_record(&confirmed);

        let bucket = store.messages_of(&key);
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket[0].id, "42");

        let events = store.drain_events();
        assert!(events.contains(&CoreEvent::Promoted {
            key: key.clone(),
            old_id: provisional.id,
            new_id: "42".to_string(),
        }));
        assert!(events.contains(&CoreEvent::Updated(key)));
    }

    #[test]
    fn own_confirmed_messages_are_never_unread() {
        let mut store = store();
        store.activate(ConversationKey::Direct("bob".to_string()));
        store.drain_events();

        // Own echo from a poll while another conversation is active
        store.activate(ConversationKey::Broadcast);
        store.ingest_record(&record("42", "alice", "bob", "hi", 1000));
        assert_eq!(
            store.unread_count_of(&ConversationKey::Direct("bob".to_string())),
            0
        );

        // The reply from bob does count
        store.ingest_record(&record("43", "bob", "alice", "yo", 2000));
        assert_eq!(
            store.unread_count_of(&ConversationKey::Direct("bob".to_string())),
            1
        );
    }

    #[test]
    fn failed_send_rolls_the_provisional_back() {
        let mut store = store();
        let provisional = store.begin_send("bob", "hi", None).unwrap();
        store.drain_events();

        store.fail_send(&provisional.id);
        let key = ConversationKey::Direct("bob".to_string());
        assert!(store.messages_of(&key).is_empty());

        let events = store.drain_events();
        assert!(events.contains(&CoreEvent::SendFailed {
            key,
            provisional_id: provisional.id,
        }));
    }

    #[test]
    fn reapplying_a_listing_is_silent() {
        let mut store = store();
        let records = vec![
            record("1", "carol", "all", "a", 1000),
            record("2", "dave", "all", "b", 2000),
        ];
        store.apply_listing("all", &records);
        assert!(store.is_initial_synced("all"));
        assert!(!store.drain_events().is_empty());

        store.apply_listing("all", &records);
        assert!(store.drain_events().is_empty());
    }

    #[test]
    fn listings_propagate_remote_deletions() {
        let mut store = store();
        store.activate(ConversationKey::Direct("bob".to_string()));
        store.apply_listing(
            "all",
            &[
                record("1", "carol", "all", "a", 1000),
                record("2", "dave", "all", "b", 2000),
            ],
        );
        assert_eq!(store.unread_count_of(&ConversationKey::Broadcast), 2);
        store.drain_events();

        store.apply_listing("all", &[record("2", "dave", "all", "b", 2000)]);
        assert_eq!(store.messages_of(&ConversationKey::Broadcast).len(), 1);
        assert_eq!(store.unread_count_of(&ConversationKey::Broadcast), 1);
        assert!(store
            .drain_events()
            .contains(&CoreEvent::Updated(ConversationKey::Broadcast)));
    }

    #[test]
    fn deleting_a_confirmed_message_reports_it() {
        let mut store = store();
        store.ingest_record(&record("42", "bob", "alice", "hi", 1000));
        let key = ConversationKey::Direct("bob".to_string());
        store.drain_events();

        let removed = store.delete_message(&key, "42").unwrap();
        assert!(!removed.is_provisional());
        assert!(store.messages_of(&key).is_empty());
        assert_eq!(store.unread_count_of(&key), 0);
        assert!(store.delete_message(&key, "42").is_none());
    }

    #[test]
    fn identity_changes_surface_once() {
        let mut store = store();
        let snapshot = store.identity().clone();
        store.set_identity(snapshot);
        assert!(store.drain_events().is_empty());

        let mut grown = store.identity().clone();
        grown.friends.insert("erin".to_string());
        store.set_identity(grown);
        assert_eq!(store.drain_events(), vec![CoreEvent::IdentityChanged]);
    }
}
