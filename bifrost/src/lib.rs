//! # Bifrost
//!
//! Call the same registered function in-process or on a remote server, as a
//! one-shot fetch, a live binding that re-runs when its dependencies change,
//! or a subscription stream, with optional result caching on every path.
//!
//! ## Features
//!
//! - One registry of named JSON functions shared by client and server
//! - Local and remote one-shot calls with freshness-window caching
//! - Live bindings with a stale-cycle guard, driven by a pluggable reactive host
//! - Subscription channels with replay, equality suppression and ordered tokens
//! - Pluggable cache adapters, transports and call loggers
//!
//! ## One-shot calls
//!
//! ```no_run
//! use bifrost::{Bifrost, CallOptions, FnError, Registry};
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct Greet {
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Registry::new().function("greet", |p: Greet| async move {
//!         Ok::<_, FnError>(format!("Hello, {}!", p.name))
//!     });
//!
//!     let bifrost = Bifrost::builder(registry).build();
//!     let greet = bifrost.handle("greet")?;
//!
//!     let options = CallOptions::new().within(Duration::from_secs(30));
//!     let result = greet
//!         .fetch_client(serde_json::json!({"name": "world"}), options)
//!         .await?;
//!     println!("{} (from cache: {})", result.data, result.is_from_cache);
//!     Ok(())
//! }
//! ```
//!
//! ## Live bindings
//!
//! ```no_run
//! use bifrost::{Bifrost, CallOptions, Registry};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Registry::new().sync_function("double", |n: i64| Ok(n * 2));
//!     let bifrost = Bifrost::builder(registry).build();
//!
//!     let mut binding = bifrost
//!         .handle("double")?
//!         .use_client(21, vec![json!(21)], CallOptions::new())?;
//!
//!     let mut state = binding.watch();
//!     state.changed().await?;
//!     println!("{:?}", state.borrow().data);
//!
//!     binding.update(50, vec![json!(50)])?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod instance;
pub mod invoke;
pub mod logger;
pub mod policy;
pub mod reactive;
pub mod registry;
pub mod subscription;
pub mod transport;

// Re-export main types for convenience
pub use cache::{CacheAdapter, CacheEntry, CacheStats, MemoryCache, MemoryCacheConfig};
pub use error::{BifrostError, FnError, Result};
pub use instance::{Bifrost, BifrostBuilder};
pub use invoke::{CallState, ClientSubscription, Fetched, FnHandle, LiveBinding};
pub use logger::{CallLogger, LogKind, LogRecord, TracingLogger};
pub use policy::{cache_key, AccessMode, CallOptions};
pub use reactive::{Effect, ManualHost, ReactiveHost, TokioHost};
pub use registry::{CallContext, FnOutput, Registry};
pub use subscription::{Subscribable, Subscription, Unsubscribe};
pub use transport::{transport_fn, Loopback, Transport};
