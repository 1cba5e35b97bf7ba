//! In-process marker store with TTL expiry

use super::{ProcessedStore, StoreResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn new(value: &str, ttl_secs: u64) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// `DashMap`-backed store. Expired entries read as absent and are dropped
/// lazily on access or by [`InMemoryStore::purge_expired`].
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, StoredValue>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, stored| !stored.is_expired(now));
        before - self.entries.len()
    }

    /// Number of entries held, including ones expired but not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl ProcessedStore for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(stored) if !stored.is_expired(now) => return Ok(Some(stored.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }

        self.entries.remove_if(key, |_, stored| stored.is_expired(now));
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        self.entries
            .insert(key.to_string(), StoredValue::new(value, ttl_secs));
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<bool> {
        // The entry guard holds the shard lock, so check and insert are atomic
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(Instant::now()) {
                    occupied.insert(StoredValue::new(value, ttl_secs));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(value, ttl_secs));
                Ok(true)
            }
        }
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .filter(|entry| glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }
}

/// Redis-style glob matching limited to `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            p = star_p + 1;
            t = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("processed:*", "processed:booking-42"));
        assert!(glob_match("processed:*", "processed:"));
        assert!(!glob_match("processed:*", "cache:booking-42"));
        assert!(glob_match("*:42", "booking:42"));
        assert!(glob_match("p?ocessed:*", "processed:x"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[tokio::test]
    async fn test_get_and_set() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set_ex("k", "1", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("1".to_string()));

        // Last write wins
        store.set_ex("k", "2", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_set_nx_only_creates_once() {
        let store = InMemoryStore::new();
        assert!(store.set_nx_ex("k", "first", 60).await.unwrap());
        assert!(!store.set_nx_ex("k", "second", 60).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn test_expiry() {
        let store = InMemoryStore::new();
        store.set_ex("k", "v", 1).await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.keys("*").await.unwrap().is_empty());
        // Expired entry can be recreated with NX
        assert!(store.set_nx_ex("k", "again", 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryStore::new();
        store.set_ex("short", "v", 1).await.unwrap();
        store.set_ex("long", "v", 60).await.unwrap();
        assert_eq!(store.len(), 2);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_keys_filters_by_pattern() {
        let store = InMemoryStore::new();
        store.set_ex("processed:a", "1", 60).await.unwrap();
        store.set_ex("processed:b", "1", 60).await.unwrap();
        store.set_ex("cache:c", "1", 60).await.unwrap();

        let keys = store.keys("processed:*").await.unwrap();
        assert_eq!(keys, vec!["processed:a".to_string(), "processed:b".to_string()]);
    }
}
