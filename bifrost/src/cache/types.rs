//! Core type definitions for the cache layer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type - produced by [`crate::policy::cache_key`]
pub type CacheKey = String;

/// Statistics for the in-process cache
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of cache hits
    pub hits: u64,

    /// Total number of cache misses
    pub misses: u64,

    /// Total number of writes
    pub writes: u64,

    /// Number of entries currently in cache
    pub entries: usize,

    /// Approximate size of cached data in bytes
    pub size_bytes: usize,

    /// Number of evictions due to the entry limit
    pub evictions_size: u64,

    /// Number of evictions due to retention expiry
    pub evictions_ttl: u64,

    /// Number of manual removals
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate total evictions
    pub fn total_evictions(&self) -> u64 {
        self.evictions_size + self.evictions_ttl
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, writes: {}, entries: {}, size: {} bytes, evictions: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.writes,
            self.entries,
            self.size_bytes,
            self.total_evictions()
        )
    }
}
