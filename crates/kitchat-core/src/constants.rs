//! Application-wide constants
//!
//! Centralized location for magic strings and tuning values that are
//! used across multiple modules.

/// Conversation key of the shared broadcast channel.
pub const BROADCAST_KEY: &str = "all";

/// Prefix that marks a group-scoped conversation key, e.g. `group:lunch`.
pub const GROUP_PREFIX: &str = "group:";

/// Prefix that marks a locally assigned, not-yet-confirmed message id.
pub const PROVISIONAL_PREFIX: &str = "temp-";

/// Maximum timestamp delta (milliseconds) when correlating a provisional
/// entry with the server's copy of the same message. Wide enough for
/// client/server clock skew, tight enough not to merge distinct messages
/// from a fast-typing burst.
pub const MATCH_WINDOW_MS: u64 = 15_000;

/// Default cadence for the message poll.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Default cadence for refreshing the friends/groups snapshot.
pub const IDENTITY_REFRESH_MS: u64 = 15_000;

/// Maximum length of a text message body, matching the server's limit.
pub const MAX_TEXT_LEN: usize = 350;
