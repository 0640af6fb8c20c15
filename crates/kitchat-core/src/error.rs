use thiserror::Error;

/// Error taxonomy for the sync core.
///
/// `Http` and `Api` are transient: the operation is abandoned for the
/// current cycle and the next scheduled poll is the retry. `Validation`
/// is surfaced to the caller before any state is touched.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("{0}")]
    Validation(String),

    #[error("core runtime is shut down")]
    ChannelClosed,
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Transient failures leave the view stale; everything else is a
    /// caller mistake.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Api { .. })
    }
}
