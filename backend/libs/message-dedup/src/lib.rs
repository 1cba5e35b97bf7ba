//! # Message Deduplication
//!
//! Idempotency gate for event consumers sitting behind an at-least-once
//! transport (Kafka booking confirmations, payment events, click tracking).
//! Each unit of work carries a caller-chosen message ID; the gate records a
//! short-lived marker for it in a key-value store with per-key expiry and
//! answers "first delivery, process it" or "repeat, skip it".
//!
//! ## Architecture
//!
//! ```text
//! Kafka → Consumer → MessageDeduplicator → Business Logic → MySQL
//!                          ↓
//!                   (SET NX EX / GET)
//!                          ↓
//!                        Redis
//!              (processed:{message_id} = marked_at_ms)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use message_dedup::{DedupConfig, MessageDeduplicator, RedisStore};
//! use redis_utils::{RedisConfig, RedisPool};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = RedisPool::connect(&RedisConfig::from_env()).await?;
//! let dedup = MessageDeduplicator::with_config(
//!     RedisStore::from_pool(&pool),
//!     DedupConfig::from_env()?,
//! )?;
//!
//! if dedup.check_and_mark("booking-42").await? {
//!     confirm_booking().await?;
//! } else {
//!     // Redelivery, already handled
//! }
//! # Ok(())
//! # }
//! # async fn confirm_booking() -> anyhow::Result<()> { Ok(()) }
//! ```
//!
//! ## Semantics
//!
//! - Markers live for the configured TTL (7 days by default). After expiry
//!   an ID is indistinguishable from one never seen, so the guarantee only
//!   holds inside the TTL horizon. Pick a TTL at or above the broker's
//!   retention.
//! - [`MessageDeduplicator::check_and_mark`] claims the ID with a single
//!   `SET key value NX EX ttl`, so two consumers racing on the same ID
//!   cannot both get `true`.
//! - The gate fails open. If the store is down, times out or errors, reads
//!   report "not processed" and writes are dropped with a warning. A store
//!   outage degrades into possible duplicate processing, never into a
//!   stalled pipeline.
//! - Invalid IDs (empty, longer than 255 bytes) are rejected before the
//!   store is touched.
//!
//! ## Key namespace
//!
//! Markers are stored at `processed:{message_id}`; `processed:*` lists them
//! all. The prefix can be changed through [`DedupConfig`] but should stay
//! stable so operators can inspect or clear markers by hand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

mod config;
mod error;
mod keys;
mod metrics;
mod stats;
pub mod store;

pub use config::{DedupConfig, DEFAULT_TTL_SECS};
pub use error::{DedupError, DedupResult, StoreError};
pub use keys::{MarkerKey, DEFAULT_KEY_PREFIX};
pub use metrics::DedupMetrics;
pub use stats::DedupStats;
pub use store::{InMemoryStore, ProcessedStore, RedisStore};

/// Longest accepted message ID, in bytes
pub const MAX_MESSAGE_ID_LEN: usize = 255;

/// Result of processing a message through [`MessageDeduplicator::process_if_new`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingResult {
    /// Message was processed successfully (first time)
    Success,

    /// Message was already processed before (duplicate)
    AlreadyProcessed,

    /// Processing failed; the message was left unmarked
    Failed(String),
}

impl ProcessingResult {
    /// Check if processing was successful (either first time or already processed)
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            ProcessingResult::Success | ProcessingResult::AlreadyProcessed
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProcessingResult::Failed(_))
    }
}

/// A live marker as read back from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedMarker {
    pub message_id: String,

    /// When the message was first marked. `None` if the stored value is not
    /// a millisecond timestamp (e.g. a marker written out-of-band).
    pub marked_at: Option<DateTime<Utc>>,
}

/// Idempotency gate over a [`ProcessedStore`].
///
/// Cheap to clone; clones share the store. Safe to use from many tasks.
#[derive(Clone)]
pub struct MessageDeduplicator {
    store: Arc<dyn ProcessedStore>,
    keys: MarkerKey,
    ttl_secs: u64,
    metrics: DedupMetrics,
}

impl MessageDeduplicator {
    /// Gate with the default configuration (7-day TTL, `processed:` prefix).
    pub fn new(store: impl ProcessedStore + 'static) -> Self {
        Self::from_shared(Arc::new(store), DedupConfig::default())
    }

    /// Gate with a validated custom configuration.
    pub fn with_config(
        store: impl ProcessedStore + 'static,
        config: DedupConfig,
    ) -> DedupResult<Self> {
        config.validate()?;
        Ok(Self::from_shared(Arc::new(store), config))
    }

    /// Gate over a store already shared with other components.
    ///
    /// The configuration is trusted as-is; call [`DedupConfig::validate`]
    /// first if it came from user input.
    pub fn from_shared(store: Arc<dyn ProcessedStore>, config: DedupConfig) -> Self {
        Self {
            store,
            keys: MarkerKey::new(config.key_prefix),
            ttl_secs: config.ttl_secs,
            metrics: DedupMetrics::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn key_pattern(&self) -> String {
        self.keys.pattern()
    }

    /// Whether `message_id` has a live marker.
    ///
    /// Returns `Ok(false)` when the store cannot be reached (fail open).
    /// Only an invalid ID produces an error.
    pub async fn is_processed(&self, message_id: &str) -> DedupResult<bool> {
        Self::validate_message_id(message_id)?;
        let key = self.keys.for_message(message_id);

        match self.store.get(&key).await {
            Ok(Some(value)) => {
                debug!(
                    message_id = %message_id,
                    processed_at = %describe_marked_at(&value),
                    "Duplicate message detected"
                );
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                self.record_store_error("is_processed", message_id, &e);
                warn!(
                    message_id = %message_id,
                    "Treating message as not processed (fail open)"
                );
                Ok(false)
            }
        }
    }

    /// Record `message_id` as processed now, expiring after the TTL.
    ///
    /// Overwrites an existing marker. Store failures are logged and
    /// swallowed: the marker is lost and a later redelivery may be
    /// processed again.
    pub async fn mark_processed(&self, message_id: &str) -> DedupResult<()> {
        Self::validate_message_id(message_id)?;
        let key = self.keys.for_message(message_id);

        match self
            .store
            .set_ex(&key, &marked_at_now(), self.ttl_secs)
            .await
        {
            Ok(()) => {
                self.metrics.record_mark();
                info!(
                    message_id = %message_id,
                    ttl_secs = self.ttl_secs,
                    "Marked as processed"
                );
            }
            Err(e) => {
                self.record_store_error("mark_processed", message_id, &e);
            }
        }

        Ok(())
    }

    /// Claim `message_id` for processing.
    ///
    /// - `Ok(true)`: first delivery within the TTL, the marker is now set;
    ///   go ahead and process.
    /// - `Ok(false)`: duplicate, skip it. No marker is written.
    ///
    /// Check and mark happen in one `SET NX EX` round trip, so concurrent
    /// callers with the same ID get exactly one `true` between them. If the
    /// store fails the call returns `Ok(true)` (fail open) without a marker.
    pub async fn check_and_mark(&self, message_id: &str) -> DedupResult<bool> {
        Self::validate_message_id(message_id)?;
        let key = self.keys.for_message(message_id);

        match self
            .store
            .set_nx_ex(&key, &marked_at_now(), self.ttl_secs)
            .await
        {
            Ok(true) => {
                self.metrics.record_new();
                self.metrics.record_mark();
                info!(
                    message_id = %message_id,
                    ttl_secs = self.ttl_secs,
                    "Marked as processed"
                );
                Ok(true)
            }
            Ok(false) => {
                self.metrics.record_duplicate();
                warn!(message_id = %message_id, "Duplicate message skipped");
                Ok(false)
            }
            Err(e) => {
                self.record_store_error("check_and_mark", message_id, &e);
                warn!(
                    message_id = %message_id,
                    "Allowing message without marker (fail open)"
                );
                Ok(true)
            }
        }
    }

    /// Run `f` only if `message_id` has not been processed, marking it after
    /// `f` succeeds.
    ///
    /// Unlike [`check_and_mark`](Self::check_and_mark) the marker is written
    /// after the work, so a failed `f` leaves the message unmarked and a
    /// redelivery retries it. The flip side is that two concurrent deliveries
    /// of the same ID can both run `f`; claim with `check_and_mark` first
    /// when that matters more than retry-on-failure.
    pub async fn process_if_new<F, Fut>(
        &self,
        message_id: &str,
        f: F,
    ) -> DedupResult<ProcessingResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), anyhow::Error>>,
    {
        if self.is_processed(message_id).await? {
            self.metrics.record_duplicate();
            return Ok(ProcessingResult::AlreadyProcessed);
        }
        self.metrics.record_new();

        match f().await {
            Ok(()) => {
                self.mark_processed(message_id).await?;
                Ok(ProcessingResult::Success)
            }
            Err(e) => {
                warn!(
                    message_id = %message_id,
                    error = ?e,
                    "Message processing failed"
                );
                Ok(ProcessingResult::Failed(e.to_string()))
            }
        }
    }

    /// Count live markers in the namespace.
    ///
    /// Walks every key matching the prefix: cost grows with the number of
    /// live markers. Meant for admin and diagnostic endpoints, not per
    /// message. Reports zero if the store fails.
    pub async fn get_stats(&self) -> DedupStats {
        let key_pattern = self.keys.pattern();

        match self.store.keys(&key_pattern).await {
            Ok(keys) => DedupStats {
                total_processed: keys.len() as u64,
                key_pattern,
            },
            Err(e) => {
                self.metrics.record_store_error("get_stats", e.kind());
                warn!(error = %e, "Failed to count processed markers");
                DedupStats::empty(key_pattern)
            }
        }
    }

    /// Read back the marker for `message_id`, if one is live.
    ///
    /// Operator-facing: store errors are returned, not absorbed.
    pub async fn marker(&self, message_id: &str) -> DedupResult<Option<ProcessedMarker>> {
        Self::validate_message_id(message_id)?;
        let key = self.keys.for_message(message_id);

        let value = self.store.get(&key).await?;
        Ok(value.map(|raw| ProcessedMarker {
            message_id: message_id.to_string(),
            marked_at: parse_marked_at(&raw),
        }))
    }

    fn record_store_error(&self, operation: &str, message_id: &str, err: &StoreError) {
        self.metrics.record_store_error(operation, err.kind());
        warn!(
            message_id = %message_id,
            operation = operation,
            error = %err,
            "Dedup store operation failed"
        );
    }

    fn validate_message_id(message_id: &str) -> DedupResult<()> {
        if message_id.is_empty() {
            return Err(DedupError::InvalidMessageId(
                "Message ID cannot be empty".to_string(),
            ));
        }

        if message_id.len() > MAX_MESSAGE_ID_LEN {
            return Err(DedupError::InvalidMessageId(format!(
                "Message ID too long: {} bytes (max {})",
                message_id.len(),
                MAX_MESSAGE_ID_LEN
            )));
        }

        Ok(())
    }
}

fn marked_at_now() -> String {
    Utc::now().timestamp_millis().to_string()
}

fn parse_marked_at(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

fn describe_marked_at(raw: &str) -> String {
    match parse_marked_at(raw) {
        Some(ts) => ts.to_rfc3339(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_message_id() {
        // Valid
        assert!(MessageDeduplicator::validate_message_id("booking-42").is_ok());
        assert!(MessageDeduplicator::validate_message_id("a").is_ok());
        assert!(MessageDeduplicator::validate_message_id(&"x".repeat(255)).is_ok());

        // Invalid: empty
        let err = MessageDeduplicator::validate_message_id("").unwrap_err();
        assert!(matches!(err, DedupError::InvalidMessageId(_)));

        // Invalid: too long
        let err = MessageDeduplicator::validate_message_id(&"x".repeat(256)).unwrap_err();
        assert!(matches!(err, DedupError::InvalidMessageId(_)));
    }

    #[test]
    fn test_processing_result() {
        assert!(ProcessingResult::Success.is_ok());
        assert!(ProcessingResult::AlreadyProcessed.is_ok());
        assert!(!ProcessingResult::Failed("error".to_string()).is_ok());

        assert!(!ProcessingResult::Success.is_failed());
        assert!(ProcessingResult::Failed("error".to_string()).is_failed());
    }

    #[test]
    fn test_parse_marked_at() {
        let ts = parse_marked_at("1700000000000").unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);

        assert_eq!(parse_marked_at("not-a-timestamp"), None);
        assert_eq!(describe_marked_at("garbage"), "unknown");
    }

    #[test]
    fn test_marked_at_now_roundtrips() {
        let before = Utc::now().timestamp_millis();
        let parsed = parse_marked_at(&marked_at_now()).unwrap();
        assert!(parsed.timestamp_millis() >= before);
    }

    #[test]
    fn test_default_gate_settings() {
        let dedup = MessageDeduplicator::new(InMemoryStore::new());
        assert_eq!(dedup.ttl(), Duration::from_secs(7 * 24 * 60 * 60));
        assert_eq!(dedup.key_pattern(), "processed:*");
    }

    #[test]
    fn test_with_config_validates() {
        let config = DedupConfig {
            ttl_secs: 0,
            ..DedupConfig::default()
        };
        assert!(matches!(
            MessageDeduplicator::with_config(InMemoryStore::new(), config),
            Err(DedupError::Configuration(_))
        ));
    }
}
