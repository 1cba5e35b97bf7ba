//! Marker key schema
//!
//! Every marker lives at `{prefix}{message_id}`. The default prefix is
//! `processed:` so operators can list or clear markers with `processed:*`.

/// Default namespace for processed-message markers.
pub const DEFAULT_KEY_PREFIX: &str = "processed:";

/// Builds marker keys and the stats pattern for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerKey {
    prefix: String,
}

impl Default for MarkerKey {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl MarkerKey {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Format: {prefix}{message_id}
    pub fn for_message(&self, message_id: &str) -> String {
        format!("{}{}", self.prefix, message_id)
    }

    /// Format: {prefix}*
    pub fn pattern(&self) -> String {
        self.for_message("*")
    }

    /// Strip the namespace, returning the raw message ID.
    pub fn message_id<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())
    }
}
