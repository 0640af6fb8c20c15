use crate::route::ConversationKey;

/// Notifications surfaced to the frontend after store mutations.
///
/// `Updated` fires only when an ingest, removal or activation actually
/// changed what a conversation renders as; re-applying an unchanged
/// server window produces nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    Updated(ConversationKey),
    /// A provisional entry was replaced by its authoritative copy.
    /// Frontends retarget any state keyed by `old_id` onto `new_id`.
    Promoted {
        key: ConversationKey,
        old_id: String,
        new_id: String,
    },
    /// A send was rejected by the server; the provisional entry has
    /// already been rolled back.
    SendFailed {
        key: ConversationKey,
        provisional_id: String,
    },
    IdentityChanged,
}
