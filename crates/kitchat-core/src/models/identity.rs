use std::collections::HashSet;

use serde::Deserialize;

/// Read-only snapshot of who the session is and who it can talk to.
/// Refreshed by the sync worker; the store never mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySnapshot {
    pub username: String,
    /// Accepted friends, eligible for direct messages.
    pub friends: HashSet<String>,
    /// Names (without the `group:` prefix) of groups the user belongs to.
    pub groups: HashSet<String>,
}

impl IdentitySnapshot {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn from_wire(
        username: &str,
        friends: FriendsResponse,
        groups: Vec<GroupRecord>,
    ) -> Self {
        Self {
            username: username.to_string(),
            friends: friends.friends_accepted.into_iter().collect(),
            groups: groups
                .into_iter()
                .filter(|g| g.members.iter().any(|m| m == username))
                .map(|g| g.name)
                .collect(),
        }
    }

    pub fn is_friend(&self, user: &str) -> bool {
        self.friends.contains(user)
    }

    pub fn is_member(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendsResponse {
    #[serde(default)]
    pub friends_accepted: Vec<String>,
    #[serde(default)]
    pub friends_requested_in: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupRecord {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default, rename = "createdBy")]
    pub created_by: Option<String>,
}
