use std::fmt;

use crate::constants::{BROADCAST_KEY, GROUP_PREFIX};
use crate::models::Message;

/// Identifier a conversation bucket is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Broadcast,
    /// Group name without the `group:` prefix.
    Group(String),
    /// The other party of a direct exchange.
    Direct(String),
}

impl ConversationKey {
    /// Parse a raw target string as it appears on the wire or in user
    /// commands: `all`, `group:<name>`, or a peer username.
    pub fn parse(raw: &str) -> Self {
        if raw == BROADCAST_KEY {
            Self::Broadcast
        } else if let Some(name) = raw.strip_prefix(GROUP_PREFIX) {
            Self::Group(name.to_string())
        } else {
            Self::Direct(raw.to_string())
        }
    }

    /// Wire form of the key, the inverse of `parse`.
    pub fn label(&self) -> String {
        match self {
            Self::Broadcast => BROADCAST_KEY.to_string(),
            Self::Group(name) => format!("{GROUP_PREFIX}{name}"),
            Self::Direct(peer) => peer.clone(),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct(_))
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Map a message to the single conversation it belongs to.
///
/// Direct exchanges collapse onto the other party's key regardless of
/// direction, so both halves of a dialogue land in one bucket.
pub fn route(message: &Message, local_user: &str) -> ConversationKey {
    if let Some(name) = message.to.strip_prefix(GROUP_PREFIX) {
        ConversationKey::Group(name.to_string())
    } else if message.to == BROADCAST_KEY {
        ConversationKey::Broadcast
    } else if message.from == local_user {
        ConversationKey::Direct(message.to.clone())
    } else {
        ConversationKey::Direct(message.from.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageBody;

    fn message(from: &str, to: &str) -> Message {
        Message {
            id: "1".to_string(),
            from: from.to_string(),
            to: to.to_string(),
            body: MessageBody::Text("hi".to_string()),
            reply_to: None,
            timestamp: 0,
        }
    }

    #[test]
    fn group_target_routes_verbatim() {
        assert_eq!(
            route(&message("alice", "group:lunch"), "alice"),
            ConversationKey::Group("lunch".to_string())
        );
    }

    #[test]
    fn broadcast_target_routes_to_broadcast() {
        assert_eq!(
            route(&message("alice", "all"), "bob"),
            ConversationKey::Broadcast
        );
    }

    #[test]
    fn direct_exchange_collapses_onto_one_key() {
        let outbound = route(&message("alice", "bob"), "alice");
        let inbound = route(&message("bob", "alice"), "alice");
        assert_eq!(outbound, ConversationKey::Direct("bob".to_string()));
        assert_eq!(outbound, inbound);

        // Same exchange seen from bob's side keys on alice
        assert_eq!(
            route(&message("alice", "bob"), "bob"),
            ConversationKey::Direct("alice".to_string())
        );
        assert_eq!(
            route(&message("bob", "alice"), "bob"),
            ConversationKey::Direct("alice".to_string())
        );
    }

    #[test]
    fn label_round_trips_through_parse() {
        for raw in ["all", "group:lunch", "bob"] {
            assert_eq!(ConversationKey::parse(raw).label(), raw);
        }
    }
}
