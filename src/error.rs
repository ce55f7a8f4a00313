//! Error types for the tiered cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the tiered cache
///
/// Only [`Error::Config`] is ever returned from the public `CacheManager`
/// operations. Codec and tier errors surface from the lower-level building
/// blocks and are absorbed by the manager as cache misses or degradation.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid construction parameters or a precondition violation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stored bytes could not be decoded (or a value could not be encoded)
    #[error("Codec {codec} failed: {reason}")]
    Codec { codec: String, reason: String },

    /// Shared tier failure
    #[error(transparent)]
    Tier(#[from] TierError),

    /// I/O error (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics registration or encoding failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Shared tier failures (network, timeout, protocol)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TierError {
    /// Connection could not be established
    #[error("Shared tier connection failed: {0}")]
    Connect(String),

    /// Call exceeded the configured timeout
    #[error("Shared tier call '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Remote store answered with an error or an unexpected reply
    #[error("Shared tier protocol error: {0}")]
    Protocol(String),

    /// Operation attempted before `connect` succeeded
    #[error("Shared tier is not connected")]
    NotConnected,
}

impl From<redis::RedisError> for TierError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            TierError::Connect(err.to_string())
        } else if err.is_timeout() {
            TierError::Timeout {
                operation: "redis".to_string(),
                timeout_ms: 0,
            }
        } else {
            TierError::Protocol(err.to_string())
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
