//! Gate configuration

use crate::error::{DedupError, DedupResult};
use crate::keys::DEFAULT_KEY_PREFIX;
use std::time::Duration;

/// Default marker lifetime: 7 days.
///
/// Keep this at or above the broker's retention window so a replayed
/// message is still recognised as a duplicate.
pub const DEFAULT_TTL_SECS: u64 = 7 * 24 * 60 * 60;

const GLOB_METACHARS: &[char] = &['*', '?', '[', ']', '\\'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupConfig {
    /// Marker lifetime in seconds (>= 1)
    pub ttl_secs: u64,
    /// Key namespace, e.g. `processed:`
    pub key_prefix: String,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl DedupConfig {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl_secs: ttl.as_secs(),
            ..Self::default()
        }
    }

    /// Read `DEDUP_TTL_SECS` and `DEDUP_KEY_PREFIX`, falling back to defaults
    /// for unset variables.
    pub fn from_env() -> DedupResult<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("DEDUP_TTL_SECS") {
            config.ttl_secs = raw.trim().parse::<u64>().map_err(|e| {
                DedupError::Configuration(format!("DEDUP_TTL_SECS must be a valid u64: {}", e))
            })?;
        }

        if let Ok(prefix) = std::env::var("DEDUP_KEY_PREFIX") {
            config.key_prefix = prefix;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DedupResult<()> {
        if self.ttl_secs == 0 {
            return Err(DedupError::Configuration(
                "TTL must be at least 1 second".to_string(),
            ));
        }

        if self.key_prefix.is_empty() {
            return Err(DedupError::Configuration(
                "Key prefix cannot be empty".to_string(),
            ));
        }

        // The prefix is spliced into the SCAN MATCH pattern used for stats
        if let Some(c) = self.key_prefix.chars().find(|c| GLOB_METACHARS.contains(c)) {
            return Err(DedupError::Configuration(format!(
                "Key prefix cannot contain glob character '{}'",
                c
            )));
        }

        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var("DEDUP_TTL_SECS");
        std::env::remove_var("DEDUP_KEY_PREFIX");
    }

    #[test]
    fn test_defaults() {
        let config = DedupConfig::default();
        assert_eq!(config.ttl_secs, 604_800);
        assert_eq!(config.key_prefix, "processed:");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_ttl() {
        let config = DedupConfig::with_ttl(Duration::from_secs(60));
        assert_eq!(config.ttl(), Duration::from_secs(60));
        assert_eq!(config.key_prefix, DEFAULT_KEY_PREFIX);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        // Sub-second durations truncate to 0 and cannot be expressed as EX
        let config = DedupConfig::with_ttl(Duration::from_millis(500));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DedupError::Configuration(_)));
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let config = DedupConfig {
            key_prefix: String::new(),
            ..DedupConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DedupError::Configuration(_))
        ));
    }

    #[test]
    fn test_glob_prefix_rejected() {
        for prefix in ["processed:*", "proc?ssed:", "processed:[a]:", "processed\\:"] {
            let config = DedupConfig {
                key_prefix: prefix.to_string(),
                ..DedupConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(DedupError::Configuration(_))),
                "prefix {:?} should be rejected",
                prefix
            );
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = DedupConfig::from_env().unwrap();
        assert_eq!(config, DedupConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("DEDUP_TTL_SECS", " 3600 ");
        std::env::set_var("DEDUP_KEY_PREFIX", "kafka:processed:");

        let config = DedupConfig::from_env().unwrap();
        assert_eq!(config.ttl_secs, 3600);
        assert_eq!(config.key_prefix, "kafka:processed:");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_unparseable_ttl() {
        clear_env();
        std::env::set_var("DEDUP_TTL_SECS", "a week");

        let result = DedupConfig::from_env();
        assert!(matches!(result, Err(DedupError::Configuration(_))));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_zero_ttl() {
        clear_env();
        std::env::set_var("DEDUP_TTL_SECS", "0");

        assert!(matches!(
            DedupConfig::from_env(),
            Err(DedupError::Configuration(_))
        ));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_empty_prefix() {
        clear_env();
        std::env::set_var("DEDUP_KEY_PREFIX", "");

        assert!(matches!(
            DedupConfig::from_env(),
            Err(DedupError::Configuration(_))
        ));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_glob_prefix() {
        clear_env();
        std::env::set_var("DEDUP_KEY_PREFIX", "processed:*");

        assert!(matches!(
            DedupConfig::from_env(),
            Err(DedupError::Configuration(_))
        ));

        clear_env();
    }
}
