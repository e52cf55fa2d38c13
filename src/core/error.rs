//! Error types for the streaming asset cache

use thiserror::Error;

/// Main error type for asset loading
///
/// Errors are `Clone` because a single failed load is delivered to every
/// requester that attached to it while it was pending.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("fetch of {url} failed: {message}")]
    Fetch {
        url: String,
        message: String,
        /// Whether another attempt may succeed (transport errors, 5xx)
        retryable: bool,
    },

    #[error("failed to decode {asset}: {message}")]
    Decode {
        asset: &'static str,
        message: String,
    },

    #[error("gave up loading {url} after {attempts} attempts: {last}")]
    LoadLimitExceeded {
        url: String,
        attempts: u32,
        last: Box<Error>,
    },

    #[error("decode worker error: {0}")]
    Worker(String),

    #[error("invalid chunk index: {0:?}")]
    InvalidIndex(String),

    #[error("chunk {0} is outside the addressable world")]
    ChunkOutOfRange(String),

    #[error("invalid model name: {0:?}")]
    InvalidModelName(String),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Build a decode error for the given asset kind
    pub fn decode(asset: &'static str, message: impl Into<String>) -> Self {
        Error::Decode {
            asset,
            message: message.into(),
        }
    }

    /// Whether retrying the same request could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Fetch { retryable: true, .. })
    }
}
