use std::time::Duration;

use crate::constants::{DEFAULT_POLL_INTERVAL_MS, IDENTITY_REFRESH_MS, MATCH_WINDOW_MS};

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Base URL of the message store, without a trailing slash.
    pub base_url: String,
    /// Username the session acts as.
    pub username: String,
    pub poll_interval: Duration,
    pub identity_refresh: Duration,
    pub match_window: Duration,
}

impl CoreConfig {
    pub fn new(base_url: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            identity_refresh: Duration::from_millis(IDENTITY_REFRESH_MS),
            match_window: Duration::from_millis(MATCH_WINDOW_MS),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
