//! Keyed, TTL-bounded query result cache.
//!
//! A `HashMap` behind a single `RwLock`: short critical sections, no
//! lock held across an `.await` that does real work.

use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const DEFAULT_TTL: Duration = Duration::from_secs(300);
const DEFAULT_MAX_ENTRIES: usize = 10_000;

struct Entry {
    value: Json,
    expires_at: Instant,
    tags: Vec<String>,
}

/// Hit/miss counters, exposed for health checks and `HealthCheck()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Successful `get` calls that found a live entry.
    pub hits: u64,
    /// `get` calls that found nothing or an expired entry.
    pub misses: u64,
    /// Entries currently held (expired-but-not-yet-evicted entries are
    /// not counted; `get` reaps them lazily).
    pub entries: usize,
}

/// Process-local, TTL-bounded cache of query results, keyed by a
/// caller-supplied string and tagged with the tables each entry
/// depends on.
pub struct QueryCache {
    inner: RwLock<HashMap<String, Entry>>,
    max_entries: usize,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    /// Build a cache with the default 5-minute TTL and a 10,000-entry
    /// cap.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }

    /// Build a cache with explicit limits.
    pub fn with_limits(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_entries,
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch a cached value by key, if present and unexpired.
    pub async fn get(&self, key: &str) -> Option<Json> {
        let now = Instant::now();
        {
            let guard = self.inner.read().await;
            if let Some(entry) = guard.get(key) {
                if entry.expires_at > now {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
        // Expired: reap it under a write lock, then count the miss.
        self.inner.write().await.remove(key);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or replace a cached value, tagging it with the tables it
    /// depends on. Uses the cache's default TTL unless `ttl` overrides
    /// it.
    pub async fn put(&self, key: impl Into<String>, value: Json, tags: Vec<String>, ttl: Option<Duration>) {
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
        let mut guard = self.inner.write().await;

        if guard.len() >= self.max_entries && !guard.contains_key(&key.clone().into()) {
            if let Some(oldest_key) = guard
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone())
            {
                guard.remove(&oldest_key);
            }
        }

        guard.insert(key.into(), Entry { value, expires_at, tags });
    }

    /// Remove every entry whose key starts with `prefix` or whose tag
    /// list contains it. Repositories call this from write paths after a
    /// successful commit, passing the affected table's name — callers
    /// don't need to reconstruct every cache key format that might
    /// reference that table.
    pub async fn invalidate(&self, prefix: &str) {
        let mut guard = self.inner.write().await;
        guard.retain(|key, entry| {
            !key.starts_with(prefix) && !entry.tags.iter().any(|t| t == prefix)
        });
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    /// Snapshot of hit/miss counters and current entry count.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.inner.read().await.len(),
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = QueryCache::new();
        cache.put("k1", json!({"a": 1}), vec!["messages".into()], None).await;
        assert_eq!(cache.get("k1").await, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        let cache = QueryCache::with_limits(100, Duration::from_millis(10));
        cache.put("k1", json!(1), vec![], None).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k1").await, None);
    }

    #[tokio::test]
    async fn invalidate_removes_entries_by_tag() {
        let cache = QueryCache::new();
        cache.put("k1", json!(1), vec!["messages".into()], None).await;
        cache.put("k2", json!(2), vec!["conversations".into()], None).await;
        cache.invalidate("messages").await;
        assert_eq!(cache.get("k1").await, None);
        assert_eq!(cache.get("k2").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn stats_count_hits_and_misses() {
        let cache = QueryCache::new();
        cache.put("k1", json!(1), vec![], None).await;
        let _ = cache.get("k1").await;
        let _ = cache.get("missing").await;
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn eviction_drops_the_soonest_to_expire_entry_when_full() {
        let cache = QueryCache::with_limits(2, Duration::from_secs(300));
        cache.put("k1", json!(1), vec![], Some(Duration::from_millis(10))).await;
        cache.put("k2", json!(2), vec![], Some(Duration::from_secs(300))).await;
        cache.put("k3", json!(3), vec![], Some(Duration::from_secs(300))).await;
        let stats = cache.stats().await;
        assert_eq!(stats.entries, 2);
        assert_eq!(cache.get("k1").await, None);
    }
}
