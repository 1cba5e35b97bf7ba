//! Redis connection plumbing shared by the platform's Redis-backed libraries.
//!
//! Callers build a [`RedisConfig`] (usually from the environment), open a
//! [`RedisPool`] once at startup and hand its [`SharedConnectionManager`] to
//! whatever needs Redis. Nothing here is global: tests construct their own
//! pools or skip Redis entirely.

mod timeout;

pub use timeout::{
    is_timeout, run_with_timeout, DEFAULT_COMMAND_TIMEOUT_MS, MIN_COMMAND_TIMEOUT_MS,
};

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, IntoConnectionInfo};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Default Redis endpoint when `REDIS_URL` is unset.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Connection settings for a single Redis endpoint.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String,
    pub command_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            command_timeout: command_timeout.max(Duration::from_millis(MIN_COMMAND_TIMEOUT_MS)),
        }
    }

    /// Read `REDIS_URL` and `REDIS_COMMAND_TIMEOUT_MS`.
    ///
    /// Unparseable timeouts fall back to the default rather than failing
    /// startup; the floor of [`MIN_COMMAND_TIMEOUT_MS`] always applies.
    pub fn from_env() -> Self {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
        let timeout_ms = std::env::var("REDIS_COMMAND_TIMEOUT_MS")
            .ok()
            .and_then(|v| parse_timeout_ms(&v))
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_MS);

        Self::new(url, Duration::from_millis(timeout_ms))
    }
}

fn parse_timeout_ms(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

/// An open Redis connection manager plus the deadline its commands run under.
pub struct RedisPool {
    manager: SharedConnectionManager,
    command_timeout: Duration,
}

impl RedisPool {
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let info = config
            .url
            .as_str()
            .into_connection_info()
            .context("failed to parse REDIS_URL connection string")?;

        let client = Client::open(info).context("failed to construct Redis client")?;
        let connection_manager = run_with_timeout(config.command_timeout, ConnectionManager::new(client))
            .await
            .context("failed to initialize Redis connection manager")?;

        info!(
            command_timeout_ms = config.command_timeout.as_millis() as u64,
            "Redis connection manager ready"
        );

        Ok(Self {
            manager: Arc::new(Mutex::new(connection_manager)),
            command_timeout: config.command_timeout,
        })
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }
}
