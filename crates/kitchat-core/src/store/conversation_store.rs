use std::collections::{HashMap, HashSet};

use crate::models::Message;
use crate::route::ConversationKey;

/// Result of feeding one inbound message through the dedup/promotion
/// pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// False only when an exact-id re-ingest left the bucket as it was.
    pub changed: bool,
    /// True when the message produced a new bucket entry (as opposed to
    /// replacing an existing one under the same id).
    pub newly_inserted: bool,
    /// Id of the provisional entry this message replaced, if any.
    pub promoted_from: Option<String>,
}

/// Sub-store owning every conversation bucket. All mutation goes through
/// `ingest`/`append_provisional`/`remove`; buckets stay sorted by
/// timestamp ascending with stable tie order.
pub struct ConversationStore {
    buckets: HashMap<ConversationKey, Vec<Message>>,
    match_window_ms: u64,
}

impl ConversationStore {
    pub fn new(match_window_ms: u64) -> Self {
        Self {
            buckets: HashMap::new(),
            match_window_ms,
        }
    }

    // ===== Getters =====

    pub fn messages_of(&self, key: &ConversationKey) -> &[Message] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> Vec<ConversationKey> {
        self.buckets.keys().cloned().collect()
    }

    pub fn contains(&self, key: &ConversationKey, id: &str) -> bool {
        self.messages_of(key).iter().any(|m| m.id == id)
    }

    // ===== Mutations =====

    /// Reconcile one inbound (typically server-sourced) message.
    ///
    /// Evaluated in order: exact-id replace, provisional promotion within
    /// the match window, plain insert.
    pub fn ingest(&mut self, key: &ConversationKey, message: Message) -> IngestOutcome {
        let window = self.match_window_ms;
        let bucket = self.buckets.entry(key.clone()).or_default();

        // 1. Exact-id match: replace in place so re-polling the same
        //    window is a no-op.
        if let Some(pos) = bucket.iter().position(|m| m.id == message.id) {
            if bucket[pos] == message {
                return IngestOutcome::default();
            }
            bucket.remove(pos);
            insert_sorted(bucket, message);
            return IngestOutcome {
                changed: true,
                ..IngestOutcome::default()
            };
        }

        // 2. Provisional match: the bucket is timestamp-ascending, so the
        //    first hit is the earliest-created candidate.
        let matched = bucket.iter().position(|p| {
            p.is_provisional()
                && p.from == message.from
                && p.to == message.to
                && p.body == message.body
                && p.timestamp.abs_diff(message.timestamp) <= window
        });
        if let Some(pos) = matched {
            let provisional = bucket.remove(pos);
            insert_sorted(bucket, message);
            return IngestOutcome {
                changed: true,
                newly_inserted: false,
                promoted_from: Some(provisional.id),
            };
        }

        // 3. New entry.
        insert_sorted(bucket, message);
        IngestOutcome {
            changed: true,
            newly_inserted: true,
            promoted_from: None,
        }
    }

    /// Insert a locally authored, not-yet-confirmed message. A provisional
    /// id can never collide, so no dedup pass is needed.
    pub fn append_provisional(&mut self, key: &ConversationKey, message: Message) {
        let bucket = self.buckets.entry(key.clone()).or_default();
        insert_sorted(bucket, message);
    }

    pub fn remove(&mut self, key: &ConversationKey, id: &str) -> Option<Message> {
        let bucket = self.buckets.get_mut(key)?;
        let pos = bucket.iter().position(|m| m.id == id)?;
        Some(bucket.remove(pos))
    }

    /// Locate and remove an entry without knowing its conversation.
    pub fn remove_by_id(&mut self, id: &str) -> Option<(ConversationKey, Message)> {
        for (key, bucket) in self.buckets.iter_mut() {
            if let Some(pos) = bucket.iter().position(|m| m.id == id) {
                return Some((key.clone(), bucket.remove(pos)));
            }
        }
        None
    }

    /// Drop confirmed entries absent from an authoritative listing of the
    /// bucket, propagating server-side deletions. Provisional entries are
    /// untouched. Returns the removed ids.
    pub fn retain_confirmed(
        &mut self,
        key: &ConversationKey,
        listed_ids: &HashSet<&str>,
    ) -> Vec<String> {
        let Some(bucket) = self.buckets.get_mut(key) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        bucket.retain(|m| {
            let keep = m.is_provisional() || listed_ids.contains(m.id.as_str());
            if !keep {
                removed.push(m.id.clone());
            }
            keep
        });
        removed
    }
}

/// Partition-point insert keeping the bucket timestamp-ascending; equal
/// timestamps preserve insertion order.
fn insert_sorted(bucket: &mut Vec<Message>, message: Message) {
    let pos = bucket.partition_point(|m| m.timestamp <= message.timestamp);
    bucket.insert(pos, message);
}
