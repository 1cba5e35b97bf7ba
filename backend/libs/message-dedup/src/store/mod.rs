//! Backing key-value stores for processed markers
//!
//! The gate only needs four primitives with per-key expiry: read a key,
//! write a key with a TTL, create a key with a TTL only if it is absent,
//! and list keys matching a glob. Redis provides all four natively;
//! [`InMemoryStore`] emulates them for tests and single-process consumers.

mod memory;
mod redis_store;

pub use self::memory::InMemoryStore;
pub use self::redis_store::RedisStore;

use crate::error::StoreError;

/// Result type for store primitives
pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait::async_trait]
pub trait ProcessedStore: Send + Sync {
    /// `GET key`
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// `SET key value EX ttl_secs`, overwriting any existing value
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()>;

    /// `SET key value NX EX ttl_secs`; `true` when the key was created
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<bool>;

    /// All live keys matching a glob pattern (`*` and `?`)
    ///
    /// Cost is proportional to the size of the keyspace. Diagnostics only.
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;
}
