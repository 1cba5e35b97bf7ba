//! Redis-backed marker store

use super::{ProcessedStore, StoreResult};
use redis::AsyncCommands;
use redis_utils::{run_with_timeout, RedisPool, SharedConnectionManager};
use std::time::Duration;
use tracing::debug;

/// Keys fetched per SCAN round trip
const SCAN_COUNT: usize = 100;

#[derive(Clone)]
pub struct RedisStore {
    redis: SharedConnectionManager,
    command_timeout: Duration,
}

impl RedisStore {
    pub fn new(redis: SharedConnectionManager, command_timeout: Duration) -> Self {
        Self {
            redis,
            command_timeout,
        }
    }

    pub fn from_pool(pool: &RedisPool) -> Self {
        Self::new(pool.manager(), pool.command_timeout())
    }

    // ConnectionManager is a cheap handle; clone it out so the mutex is not
    // held across a network round trip.
    async fn connection(&self) -> redis::aio::ConnectionManager {
        self.redis.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl ProcessedStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection().await;
        // Raw bytes: a marker written out-of-band need not be UTF-8
        let value: Option<Vec<u8>> = run_with_timeout(self.command_timeout, conn.get(key)).await?;
        Ok(decode_marker_value(value))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.connection().await;
        run_with_timeout(
            self.command_timeout,
            conn.set_ex::<_, _, ()>(key, value, ttl_secs),
        )
        .await?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<bool> {
        let mut conn = self.connection().await;

        // Replies "OK" when the key was written, nil when it already existed
        let reply: Option<String> = run_with_timeout(
            self.command_timeout,
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(ttl_secs)
                .query_async(&mut conn),
        )
        .await?;

        Ok(reply.is_some())
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection().await;
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            // SCAN instead of KEYS so a large keyspace does not block the server
            let (next_cursor, batch): (u64, Vec<String>) = run_with_timeout(
                self.command_timeout,
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query_async(&mut conn),
            )
            .await?;

            found.extend(batch);

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once across iterations
        found.sort_unstable();
        found.dedup();

        debug!(pattern = %pattern, count = found.len(), "Scanned marker keys");
        Ok(found)
    }
}

/// Presence is what matters; undecodable bytes are replaced, never rejected.
fn decode_marker_value(raw: Option<Vec<u8>>) -> Option<String> {
    raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
