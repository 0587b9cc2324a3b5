//! # Result caching
//!
//! The bridge talks to storage only through [`CacheAdapter`]: an async
//! `get`/`set` pair over [`CacheEntry`] values. Whether an entry may stand in
//! for a real call is decided by the bridge using [`crate::policy`], never by
//! the adapter.
//!
//! [`MemoryCache`] is the in-process adapter: a mapping with LRU eviction,
//! optional retention expiry and hit/miss statistics.
//!
//! ## Example
//!
//! ```rust
//! use bifrost::cache::{CacheAdapter, MemoryCache, MemoryCacheConfig};
//! use serde_json::json;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = MemoryCacheConfig::builder()
//!     .max_entries(10_000)
//!     .build();
//!
//! let cache = MemoryCache::new(config);
//! cache.set("fetchClient-double-abc", json!(42)).await?;
//!
//! if let Some(entry) = cache.get("fetchClient-double-abc").await? {
//!     println!("Cache hit: {} (cached at {})", entry.value, entry.cached_at_ms);
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod entry;
pub mod store;
pub mod types;

pub use adapter::CacheAdapter;
pub use config::{MemoryCacheConfig, MemoryCacheConfigBuilder};
pub use entry::CacheEntry;
pub use store::{start_auto_cleanup, MemoryCache};
pub use types::{CacheKey, CacheStats};
