//! Error types for data operations.
//!
//! This module defines [`DataError`] which covers every failure the pipeline can hit
//! while fetching business data upstream, decoding events, or talking to the cache store.

use thiserror::Error;

/// Errors that can occur during data operations.
#[derive(Error, Debug)]
pub enum DataError {
    /// Required credentials or settings are missing. Raised before any network call.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The upstream answered, but not with the expected response shape.
    #[error("Unexpected upstream response: {0}")]
    UpstreamProtocol(String),

    /// Network-related errors (connection failures, timeouts, non-2xx statuses).
    #[error("Transport error: {0}")]
    Transport(String),

    /// An event payload could not be decoded by any strategy.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The cache store could not be reached or rejected the command.
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// A cache entry could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl DataError {
    /// Returns true for failures that may succeed when retried later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::CacheUnavailable(_))
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;
