//! Diagnostic snapshot of the marker namespace

use serde::{Deserialize, Serialize};

/// Result of [`crate::MessageDeduplicator::get_stats`].
///
/// Serialized with camelCase field names so admin tooling that reads
/// `{"totalProcessed": .., "keyPattern": ..}` keeps working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupStats {
    /// Live markers at the time of the scan
    pub total_processed: u64,
    /// Glob covering every marker key, e.g. `processed:*`
    pub key_pattern: String,
}

impl DedupStats {
    pub fn empty(key_pattern: impl Into<String>) -> Self {
        Self {
            total_processed: 0,
            key_pattern: key_pattern.into(),
        }
    }
}
