//! Deadline wrapper for Redis commands.
//!
//! Every command issued through [`run_with_timeout`] resolves within the
//! configured duration; an elapsed deadline comes back as an ordinary
//! `RedisError` so callers handle it like any other store failure.

use redis::RedisError;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Default command deadline in milliseconds.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 3_000;

/// Lower bound applied to configured deadlines.
pub const MIN_COMMAND_TIMEOUT_MS: u64 = 100;

/// Run a Redis future, failing with an `IoError` if it outlives `deadline`.
pub async fn run_with_timeout<F, T>(deadline: Duration, future: F) -> Result<T, RedisError>
where
    F: Future<Output = Result<T, RedisError>>,
{
    match timeout(deadline, future).await {
        Ok(res) => res,
        Err(_) => Err(timed_out_error()),
    }
}

/// Whether an error was produced by an elapsed command deadline.
pub fn is_timeout(err: &RedisError) -> bool {
    err.kind() == redis::ErrorKind::IoError && err.to_string().contains(TIMED_OUT_DESC)
}

const TIMED_OUT_DESC: &str = "redis command timed out";

fn timed_out_error() -> RedisError {
    RedisError::from((redis::ErrorKind::IoError, TIMED_OUT_DESC))
}
