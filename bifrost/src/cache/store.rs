//! In-process cache adapter with LRU eviction and optional retention expiry

use crate::cache::{
    adapter::CacheAdapter,
    config::MemoryCacheConfig,
    entry::{CacheEntry, StoredEntry},
    types::{CacheKey, CacheStats},
};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Mapping-backed [`CacheAdapter`]
///
/// This implementation provides:
/// - Thread-safe async access via RwLock
/// - LRU eviction when the entry limit is reached
/// - Optional retention expiry
/// - Hit/miss/eviction statistics
pub struct MemoryCache {
    /// Cache configuration
    pub(crate) config: MemoryCacheConfig,

    /// Internal storage
    store: Arc<RwLock<CacheStore>>,
}

/// Internal cache storage
struct CacheStore {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, StoredEntry>,

    /// LRU tracking: maintains access order
    lru_queue: VecDeque<CacheKey>,

    /// Current cache statistics
    stats: CacheStats,
}

impl MemoryCache {
    /// Create a new cache with the given configuration
    pub fn new(config: MemoryCacheConfig) -> Self {
        info!("Initializing memory cache with config: {:?}", config);

        let store = CacheStore {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            stats: CacheStats::default(),
        };

        Self {
            config,
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// Store a ready-made entry, keeping its timestamp
    pub async fn insert_entry(&self, key: CacheKey, entry: CacheEntry) {
        let stored = StoredEntry::new(&key, entry, self.config.retention_with_jitter());
        let mut store = self.store.write().await;

        if let Some(existing) = store.entries.get_mut(&key) {
            debug!("Updating existing cache entry: {}", key);
            *existing = stored;
            store.lru_queue.retain(|k| k != &key);
            store.lru_queue.push_back(key);
        } else {
            self.evict_if_needed(&mut store);
            debug!("Inserting new cache entry: {}", key);
            store.entries.insert(key.clone(), stored);
            store.lru_queue.push_back(key);
        }

        store.stats.writes += 1;
        self.update_stats(&mut store);
    }

    /// Look up an entry, dropping it if its retention has passed
    pub async fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let mut store = self.store.write().await;

        let expired = match store.entries.get(key) {
            None => {
                debug!("Cache miss: {}", key);
                store.stats.misses += 1;
                return None;
            }
            Some(stored) => stored.is_expired(),
        };

        if expired {
            debug!("Cache entry expired: {}", key);
            store.stats.misses += 1;
            store.stats.evictions_ttl += 1;
            Self::remove_entry(&mut store, key);
            return None;
        }

        let entry = store.entries.get(key).map(|stored| stored.entry.clone());
        store.stats.hits += 1;

        if self.config.enable_lru_eviction {
            store.lru_queue.retain(|k| k != key);
            store.lru_queue.push_back(key.to_string());
        }

        debug!("Cache hit: {}", key);
        entry
    }

    /// Check if a key exists in the cache (without updating access time)
    pub async fn contains_key(&self, key: &str) -> bool {
        let store = self.store.read().await;
        store.entries.contains_key(key)
    }

    /// Remove a specific entry from the cache
    pub async fn remove(&self, key: &str) -> Option<CacheEntry> {
        let mut store = self.store.write().await;
        let removed = Self::remove_entry(&mut store, key);
        if removed.is_some() {
            store.stats.invalidations += 1;
            debug!("Removed cache entry: {}", key);
        }
        removed
    }

    /// Clear all entries from the cache
    pub async fn clear(&self) {
        let mut store = self.store.write().await;

        let count = store.entries.len();
        store.entries.clear();
        store.lru_queue.clear();
        store.stats.entries = 0;
        store.stats.size_bytes = 0;
        store.stats.invalidations += count as u64;

        info!("Cleared {} entries from cache", count);
    }

    /// Remove all entries whose retention has passed
    pub async fn cleanup_expired(&self) -> usize {
        let mut store = self.store.write().await;

        let expired_keys: Vec<CacheKey> = store
            .entries
            .iter()
            .filter(|(_, stored)| stored.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            Self::remove_entry(&mut store, key);
        }

        if !expired_keys.is_empty() {
            store.stats.evictions_ttl += expired_keys.len() as u64;
            self.update_stats(&mut store);
            debug!("Cleaned up {} expired entries", expired_keys.len());
        }

        expired_keys.len()
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let store = self.store.read().await;
        store.stats.clone()
    }

    /// Get number of entries in cache
    pub async fn len(&self) -> usize {
        let store = self.store.read().await;
        store.entries.len()
    }

    /// Check if cache is empty
    pub async fn is_empty(&self) -> bool {
        let store = self.store.read().await;
        store.entries.is_empty()
    }

    /// Internal: Remove an entry from the store
    fn remove_entry(store: &mut CacheStore, key: &str) -> Option<CacheEntry> {
        let stored = store.entries.remove(key)?;
        store.lru_queue.retain(|k| k != key);
        store.stats.entries = store.entries.len();
        store.stats.size_bytes = store.stats.size_bytes.saturating_sub(stored.metadata.size_bytes);
        Some(stored.entry)
    }

    /// Internal: Evict entries until there is room for one more
    fn evict_if_needed(&self, store: &mut CacheStore) {
        while store.entries.len() >= self.config.max_entries {
            match store.lru_queue.pop_front() {
                Some(key) => {
                    debug!("Evicting entry due to max_entries limit: {}", key);
                    Self::remove_entry(store, &key);
                    store.stats.evictions_size += 1;
                }
                None => {
                    warn!("Cannot evict more entries, cache entry limit exceeded");
                    break;
                }
            }
        }
    }

    /// Internal: Update cache statistics
    fn update_stats(&self, store: &mut CacheStore) {
        store.stats.entries = store.entries.len();
        if self.config.enable_metrics {
            store.stats.size_bytes = store
                .entries
                .values()
                .map(|e| e.metadata.size_bytes)
                .sum();
        }
    }
}

#[async_trait]
impl CacheAdapter for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.lookup(key).await)
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.insert_entry(key.to_string(), CacheEntry::new(value)).await;
        Ok(())
    }
}

/// Background task for automatic cache cleanup
pub async fn start_auto_cleanup(cache: Arc<MemoryCache>) {
    let interval = cache.config.cleanup_interval;

    info!("Starting automatic cache cleanup task (interval: {:?})", interval);

    loop {
        tokio::time::sleep(interval).await;

        let removed = cache.cleanup_expired().await;
        if removed > 0 {
            debug!("Auto cleanup removed {} entries", removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_basic_set_and_get() {
        let cache = MemoryCache::new(MemoryCacheConfig::default());

        cache.set("key1", json!({"n": 1})).await.unwrap();

        let entry = cache.get("key1").await.unwrap().unwrap();
        assert_eq!(entry.value, json!({"n": 1}));
        assert!(entry.cached_at_ms <= policy::now_ms());

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.writes, 1);
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = MemoryCache::new(MemoryCacheConfig::default());

        assert_eq!(cache.get("nonexistent").await.unwrap(), None);
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let cache = MemoryCache::new(MemoryCacheConfig::default());

        cache.set("k", json!(1)).await.unwrap();
        cache.set("k", json!(2)).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap().unwrap().value, json!(2));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_entry_keeps_timestamp() {
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        cache
            .insert_entry("old".to_string(), CacheEntry::at(json!("v"), 42))
            .await;

        assert_eq!(cache.get("old").await.unwrap().unwrap().cached_at_ms, 42);
    }

    #[tokio::test]
    async fn test_retention_expiry() {
        let config = MemoryCacheConfig::builder()
            .retention(Duration::from_millis(50))
            .ttl_jitter(0.0)
            .build();
        let cache = MemoryCache::new(config);

        cache.set("key1", json!("value1")).await.unwrap();
        assert!(cache.get("key1").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.get("key1").await.unwrap().is_none());
        assert_eq!(cache.stats().await.evictions_ttl, 1);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let config = MemoryCacheConfig::builder()
            .max_entries(3)
            .enable_lru_eviction(true)
            .build();
        let cache = MemoryCache::new(config);

        cache.set("key1", json!(1)).await.unwrap();
        cache.set("key2", json!(2)).await.unwrap();
        cache.set("key3", json!(3)).await.unwrap();

        // Touch key1 so key2 becomes the oldest
        cache.get("key1").await.unwrap();

        cache.set("key4", json!(4)).await.unwrap();

        assert!(cache.get("key2").await.unwrap().is_none());
        assert!(cache.get("key1").await.unwrap().is_some());
        assert!(cache.get("key3").await.unwrap().is_some());
        assert!(cache.get("key4").await.unwrap().is_some());
        assert_eq!(cache.stats().await.evictions_size, 1);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cache = MemoryCache::new(MemoryCacheConfig::default());

        cache.set("key1", json!(1)).await.unwrap();
        cache.set("key2", json!(2)).await.unwrap();

        assert_eq!(cache.remove("key1").await.map(|e| e.value), Some(json!(1)));
        assert!(!cache.contains_key("key1").await);
        assert_eq!(cache.remove("key1").await, None);

        cache.clear().await;
        assert!(cache.is_empty().await);
        assert_eq!(cache.stats().await.invalidations, 2);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let config = MemoryCacheConfig::builder()
            .retention(Duration::from_millis(30))
            .build();
        let cache = MemoryCache::new(config);

        cache.set("key1", json!(1)).await.unwrap();
        cache.set("key2", json!(2)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(cache.cleanup_expired().await, 2);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_stats_track_size() {
        let cache = MemoryCache::new(MemoryCacheConfig::builder().enable_metrics(true).build());

        cache.set("key1", json!("value1")).await.unwrap();
        let stats = cache.stats().await;
        assert_eq!(stats.entries, 1);
        assert!(stats.size_bytes > 0);

        cache.remove("key1").await;
        assert_eq!(cache.stats().await.size_bytes, 0);
    }
}
