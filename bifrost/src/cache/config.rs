//! Configuration for the in-process cache

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`MemoryCache`](crate::cache::MemoryCache)
///
/// Freshness is decided per call by the bridge; `retention` only bounds how
/// long an entry is kept around at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Maximum number of entries in the cache
    pub max_entries: usize,

    /// How long an entry is retained; `None` keeps it until evicted
    pub retention: Option<Duration>,

    /// Retention jitter factor (0.0 - 1.0)
    /// Spreads expiry of entries written together
    pub ttl_jitter: f64,

    /// Evict least recently used entries first when full
    pub enable_lru_eviction: bool,

    /// Recompute size statistics on every write
    pub enable_metrics: bool,

    /// Interval for the background cleanup task
    pub cleanup_interval: Duration,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            retention: None,
            ttl_jitter: 0.0,
            enable_lru_eviction: true,
            enable_metrics: true,
            // Cleanup every 5 minutes
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

impl MemoryCacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> MemoryCacheConfigBuilder {
        MemoryCacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_entries == 0 {
            return Err("max_entries must be greater than 0".to_string());
        }

        if self.ttl_jitter < 0.0 || self.ttl_jitter > 1.0 {
            return Err("ttl_jitter must be between 0.0 and 1.0".to_string());
        }

        if self.retention == Some(Duration::ZERO) {
            return Err("retention must be greater than 0 when set".to_string());
        }

        Ok(())
    }

    /// Calculate actual retention with jitter applied
    pub fn retention_with_jitter(&self) -> Option<Duration> {
        let base = self.retention?;
        if self.ttl_jitter == 0.0 {
            return Some(base);
        }

        let base_secs = base.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(0.001);

        Some(Duration::from_secs_f64(final_secs))
    }

    /// Small cache for embedded clients
    pub fn small() -> Self {
        Self {
            max_entries: 500,
            retention: Some(Duration::from_secs(1800)),
            ttl_jitter: 0.10,
            ..Default::default()
        }
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct MemoryCacheConfigBuilder {
    max_entries: Option<usize>,
    retention: Option<Duration>,
    ttl_jitter: Option<f64>,
    enable_lru_eviction: Option<bool>,
    enable_metrics: Option<bool>,
    cleanup_interval: Option<Duration>,
}

impl MemoryCacheConfigBuilder {
    /// Set maximum number of cache entries
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Set how long entries are retained
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Set retention jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Enable or disable LRU eviction
    pub fn enable_lru_eviction(mut self, enable: bool) -> Self {
        self.enable_lru_eviction = Some(enable);
        self
    }

    /// Enable or disable metrics collection
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = Some(enable);
        self
    }

    /// Set cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> MemoryCacheConfig {
        let defaults = MemoryCacheConfig::default();

        MemoryCacheConfig {
            max_entries: self.max_entries.unwrap_or(defaults.max_entries),
            retention: self.retention.or(defaults.retention),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            enable_lru_eviction: self
                .enable_lru_eviction
                .unwrap_or(defaults.enable_lru_eviction),
            enable_metrics: self.enable_metrics.unwrap_or(defaults.enable_metrics),
            cleanup_interval: self.cleanup_interval.unwrap_or(defaults.cleanup_interval),
        }
    }
}
