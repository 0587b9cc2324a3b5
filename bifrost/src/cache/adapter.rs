//! Cache adapter contract

use crate::cache::entry::CacheEntry;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Storage the bridge reads cached results from and writes them to.
///
/// Implementations must tolerate concurrent `get`/`set` calls for different
/// keys; for the same key the last writer wins. A `set` must never leave a
/// partially written entry behind.
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// Fetch the entry stored under `key`
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Store `value` under `key`, stamping it with the current time
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}
