//! Cache key derivation and freshness rules
//!
//! Keys are namespaced by access mode and function name and end in a digest
//! of the canonical JSON form of the argument, so two arguments with the same
//! content hash identically whatever their key order.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// The access surface a cache entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// One-shot local call
    FetchClient,

    /// One-shot remote call
    FetchServer,

    /// Live local binding
    UseClient,

    /// Live remote binding
    UseServer,

    /// Live binding over a subscription channel
    UseClientSubscription,

    /// Callback-style subscription
    ClientSubscription,
}

impl AccessMode {
    /// Prefix used in cache keys
    pub fn prefix(&self) -> &'static str {
        match self {
            AccessMode::FetchClient => "fetchClient",
            AccessMode::FetchServer => "fetchServer",
            AccessMode::UseClient => "useClient",
            AccessMode::UseServer => "useServer",
            AccessMode::UseClientSubscription => "useClientSubscription",
            AccessMode::ClientSubscription => "getClientSubscription",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Per-call cache options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Maximum age of a cache entry that may stand in for a real call
    pub use_cache_only_within: Option<Duration>,

    /// Skip the cache for both reads and writes
    pub disable_cache: bool,
}

impl CallOptions {
    /// Options with no freshness window and caching enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept cache entries younger than `window`
    pub fn within(mut self, window: Duration) -> Self {
        self.use_cache_only_within = Some(window);
        self
    }

    /// Accept cache entries younger than `ms` milliseconds
    pub fn within_ms(self, ms: u64) -> Self {
        self.within(Duration::from_millis(ms))
    }

    /// Bypass the cache entirely
    pub fn no_cache(mut self) -> Self {
        self.disable_cache = true;
        self
    }

    /// Whether this call may touch the cache at all
    pub fn cache_enabled(&self) -> bool {
        !self.disable_cache
    }
}

/// Serialize `value` with object keys sorted at every depth
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a str cannot fail
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hex digest of the canonical form of `arg`
pub fn argument_digest(arg: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(arg).as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive the cache key for one call
pub fn cache_key(mode: AccessMode, fn_name: &str, arg: &Value) -> String {
    format!("{}-{}-{}", mode.prefix(), fn_name, argument_digest(arg))
}

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Freshness predicate against an explicit clock.
///
/// An entry cached at `T` is fresh for a window `W` iff `now < T + W`. A zero
/// window therefore never matches.
pub fn is_fresh_at(cached_at_ms: i64, window: Duration, now_ms: i64) -> bool {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    cached_at_ms > now_ms.saturating_sub(window_ms)
}

/// Freshness predicate against the wall clock
pub fn is_fresh(cached_at_ms: i64, window: Duration) -> bool {
    is_fresh_at(cached_at_ms, window, now_ms())
}
