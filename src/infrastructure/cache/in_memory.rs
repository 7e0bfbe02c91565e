//! Process-local cache implementation using moka

use std::time::Duration;

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache as MokaCache;
use tokio::time::Instant;

use crate::domain::cache::Cache;
use crate::domain::DomainError;

/// Configuration for the process-local cache
#[derive(Debug, Clone)]
pub struct InMemoryCacheConfig {
    /// Maximum number of entries
    pub max_capacity: u64,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
        }
    }
}

impl InMemoryCacheConfig {
    /// Creates a new configuration with specified max capacity
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }
}

/// Cache entry stored in moka
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Serialized value
    data: String,
    ttl: Duration,
    /// Measured on the tokio clock
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Lets moka reclaim each entry once its own TTL has passed
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Short-TTL in-process cache for values that need no cross-process sharing
///
/// Entries carry their own expiry; moka bounds capacity and reclaims memory.
/// Values go through the same `Cache`/`CacheExt` contract as the shared store.
#[derive(Debug)]
pub struct InMemoryCache {
    cache: MokaCache<String, CacheEntry>,
    config: InMemoryCacheConfig,
}

impl InMemoryCache {
    /// Creates a new in-memory cache with default configuration
    pub fn new() -> Self {
        Self::with_config(InMemoryCacheConfig::default())
    }

    /// Creates a new in-memory cache with the given configuration
    pub fn with_config(config: InMemoryCacheConfig) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self { cache, config }
    }

    pub fn config(&self) -> &InMemoryCacheConfig {
        &self.config
    }

    /// Round-trip self-test against a sentinel key
    pub async fn is_alive(&self) -> bool {
        self.health_check().await
    }

    async fn live_entry(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.cache.get(key).await?;

        if entry.is_expired() {
            self.cache.remove(key).await;
            return None;
        }

        Some(entry)
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        Ok(self.live_entry(key).await.map(|entry| entry.data))
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        let entry = CacheEntry {
            data: value.to_string(),
            ttl,
            expires_at: Instant::now() + ttl,
        };

        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self.cache.remove(key).await.is_some())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, DomainError> {
        Ok(self
            .live_entry(key)
            .await
            .map(|entry| entry.expires_at.saturating_duration_since(Instant::now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::CacheExt;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = InMemoryCache::new();

        cache
            .set("key1", "value1", Duration::from_secs(60))
            .await
            .unwrap();

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert_eq!(result, Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let cache = InMemoryCache::new();

        let result: Option<String> = cache.get("missing").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = InMemoryCache::new();

        cache
            .set("key1", "value1", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(cache.delete("key1").await.unwrap());
        assert!(!cache.delete("key1").await.unwrap());

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiration() {
        let cache = InMemoryCache::new();

        cache
            .set("height", &42_u64, Duration::from_secs(5))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(4900)).await;
        let result: Option<u64> = cache.get("height").await.unwrap();
        assert_eq!(result, Some(42));

        tokio::time::advance(Duration::from_millis(200)).await;
        let result: Option<u64> = cache.get("height").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_remaining() {
        let cache = InMemoryCache::new();

        cache
            .set("key1", "value1", Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(15)).await;

        let remaining = cache.ttl("key1").await.unwrap();
        assert_eq!(remaining, Some(Duration::from_secs(45)));
        assert!(cache.ttl("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value_and_ttl() {
        let cache = InMemoryCache::new();

        cache.set("k", &1, Duration::from_secs(1)).await.unwrap();
        cache.set("k", &2, Duration::from_secs(60)).await.unwrap();

        let value: Option<i32> = cache.get("k").await.unwrap();
        assert_eq!(value, Some(2));
        assert!(cache.ttl("k").await.unwrap().unwrap() > Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let cache = InMemoryCache::new();
        cache
            .set_string("pools", "[1, 2,", Duration::from_secs(60))
            .await
            .unwrap();

        let result: Option<Vec<u32>> = cache.get_list("pools").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_complex_types() {
        let cache = InMemoryCache::new();

        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        struct PoolStats {
            pool: String,
            utilization: Vec<u32>,
        }

        let data = PoolStats {
            pool: "usdc".to_string(),
            utilization: vec![1, 2, 3],
        };

        cache
            .set("complex", &data, Duration::from_secs(60))
            .await
            .unwrap();

        let result: Option<PoolStats> = cache.get("complex").await.unwrap();
        assert_eq!(result, Some(data));
    }

    #[tokio::test]
    async fn test_is_alive() {
        let cache = InMemoryCache::new();
        assert!(cache.is_alive().await);
    }

    #[test]
    fn test_config() {
        let config = InMemoryCacheConfig::default().with_max_capacity(100);

        let cache = InMemoryCache::with_config(config);

        assert_eq!(cache.config().max_capacity, 100);
        assert!(cache.cache.policy().time_to_live().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_longer_than_an_hour_is_kept() {
        let cache = InMemoryCache::new();

        cache
            .set("tvl:daily", &1_250_000_u64, Duration::from_secs(6 * 3600))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(5 * 3600)).await;
        let result: Option<u64> = cache.get("tvl:daily").await.unwrap();
        assert_eq!(result, Some(1_250_000));

        let remaining = cache.ttl("tvl:daily").await.unwrap();
        assert_eq!(remaining, Some(Duration::from_secs(3600)));
    }

    #[tokio::test]
    async fn test_entry_outlives_shorter_neighbours() {
        let cache = InMemoryCache::new();

        cache.set("short", &1, Duration::from_millis(100)).await.unwrap();
        cache.set("long", &2, Duration::from_secs(10)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        cache.cache.run_pending_tasks().await;

        let short: Option<i32> = cache.get("short").await.unwrap();
        let long: Option<i32> = cache.get("long").await.unwrap();
        assert!(short.is_none());
        assert_eq!(long, Some(2));
    }
}
