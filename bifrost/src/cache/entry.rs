//! Cache entries as seen by the bridge and as stored by [`MemoryCache`]
//!
//! [`MemoryCache`]: crate::cache::MemoryCache

use crate::policy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A cached function result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached result, opaque to the bridge
    pub value: Value,

    /// When the result was written, in epoch milliseconds
    pub cached_at_ms: i64,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(value: Value) -> Self {
        Self::at(value, policy::now_ms())
    }

    /// Create an entry with an explicit timestamp
    pub fn at(value: Value, cached_at_ms: i64) -> Self {
        Self {
            value,
            cached_at_ms,
        }
    }

    /// Whether the entry is young enough for `window`
    pub fn is_fresh_within(&self, window: Duration) -> bool {
        policy::is_fresh(self.cached_at_ms, window)
    }
}

/// Bookkeeping kept next to each stored entry
#[derive(Debug, Clone)]
pub(crate) struct StoredEntry {
    pub entry: CacheEntry,
    pub metadata: EntryMetadata,
}

/// Metadata associated with a stored entry
#[derive(Debug, Clone)]
pub(crate) struct EntryMetadata {
    /// When the entry stops being retained, if ever
    pub expires_at: Option<DateTime<Utc>>,

    /// Approximate size in bytes
    pub size_bytes: usize,
}

impl StoredEntry {
    pub fn new(key: &str, entry: CacheEntry, retention: Option<Duration>) -> Self {
        let now = Utc::now();
        // A retention past the end of chrono's calendar means no expiry
        let expires_at = retention
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| now.checked_add_signed(ttl));
        let size_bytes = key.len() + entry.value.to_string().len() + std::mem::size_of::<EntryMetadata>();

        Self {
            entry,
            metadata: EntryMetadata {
                expires_at,
                size_bytes,
            },
        }
    }

    /// Check if the retention period has passed
    pub fn is_expired(&self) -> bool {
        self.metadata
            .expires_at
            .map(|at| Utc::now() > at)
            .unwrap_or(false)
    }
}
