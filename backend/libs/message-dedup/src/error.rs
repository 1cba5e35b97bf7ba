//! Error types for the message deduplication library

use thiserror::Error;

/// Result type for deduplication operations
pub type DedupResult<T> = Result<T, DedupError>;

/// Errors a caller of the gate can observe.
///
/// Store failures on the hot path (`is_processed`, `mark_processed`,
/// `check_and_mark`, `get_stats`) are absorbed inside the gate and never
/// show up here; `Store` is only returned by operator-facing calls such as
/// [`crate::MessageDeduplicator::marker`].
#[derive(Error, Debug)]
pub enum DedupError {
    /// Message ID validation failed (empty or too long)
    #[error("Invalid message ID: {0}")]
    InvalidMessageId(String),

    /// Configuration value out of range or unparseable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backing store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Failures raised by a [`crate::ProcessedStore`] implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(redis::RedisError),

    /// Command did not complete before its deadline
    #[error("Store operation timed out: {0}")]
    Timeout(String),

    /// Store refused or could not serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if redis_utils::is_timeout(&err) {
            StoreError::Timeout(err.to_string())
        } else {
            StoreError::Redis(err)
        }
    }
}

impl StoreError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Redis(_) => "redis",
            StoreError::Timeout(_) => "timeout",
            StoreError::Unavailable(_) => "unavailable",
        }
    }
}
