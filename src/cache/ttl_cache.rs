// src/cache/ttl_cache.rs
//! Capacity-bounded LRU cache with a per-instance time-to-live

use moka::future::Cache;
use moka::policy::EvictionPolicy;
use std::borrow::Borrow;
use std::hash::Hash;
use std::time::Duration;
use tracing::trace;

/// Least-recently-used cache whose entries also expire `ttl` after insertion
///
/// The TTL belongs to the cache, not to individual entries. An expired
/// entry reads as absent even when the capacity bound was never reached.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    inner: Cache<K, V>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, max_capacity: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .name(name)
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self { name, ttl, inner }
    }

    pub async fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let value = self.inner.get(key).await;
        trace!("[{}] cache {}", self.name, if value.is_some() { "hit" } else { "miss" });
        value
    }

    pub async fn insert(&self, key: K, value: V) {
        self.inner.insert(key, value).await;
    }

    pub async fn remove<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.invalidate(key).await;
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Approximate number of live entries
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Apply pending evictions and expirations now
    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_get_remove() {
        let cache: TtlCache<String, u32> = TtlCache::new("test", 10, Duration::from_secs(60));

        cache.insert("a".to_string(), 1).await;
        assert_eq!(cache.get("a").await, Some(1));

        cache.remove("a").await;
        assert_eq!(cache.get("a").await, None);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache: TtlCache<i64, String> = TtlCache::new("short", 10, Duration::from_millis(50));

        cache.insert(1, "fresh".to_string()).await;
        assert_eq!(cache.get(&1).await.as_deref(), Some("fresh"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.get(&1).await, None);
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let cache: TtlCache<u32, u32> = TtlCache::new("bounded", 2, Duration::from_secs(60));

        for i in 0..5 {
            cache.insert(i, i).await;
            cache.run_pending_tasks().await;
        }

        assert!(cache.entry_count() <= 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache: TtlCache<u32, u32> = TtlCache::new("clear", 10, Duration::from_secs(60));
        cache.insert(1, 1).await;
        cache.insert(2, 2).await;

        cache.clear();
        assert_eq!(cache.get(&1).await, None);
        assert_eq!(cache.get(&2).await, None);
    }
}
