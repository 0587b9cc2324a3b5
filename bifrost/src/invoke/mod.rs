//! Access methods for a single registered function
//!
//! An [`FnHandle`] wraps one function and offers every way of calling it:
//!
//! | method                      | runs      | shape                    |
//! |-----------------------------|-----------|--------------------------|
//! | `fetch_client`              | locally   | one-shot                 |
//! | `fetch_server`              | transport | one-shot                 |
//! | `use_client`                | locally   | live binding             |
//! | `use_server`                | transport | live binding             |
//! | `use_client_subscription`   | locally   | live binding on a stream |
//! | `client_subscription`       | locally   | callback stream          |
//!
//! Each access mode caches under its own key namespace, so a `fetch_client`
//! result never answers a `use_client` read.

mod live;

pub use live::{CallState, LiveBinding};

use crate::cache::{CacheAdapter, CacheEntry};
use crate::error::{BifrostError, Result};
use crate::logger::{self, CallLogger, LogKind, LogRecord};
use crate::policy::{self, AccessMode, CallOptions};
use crate::reactive::ReactiveHost;
use crate::registry::{self, Callable, FnOutput};
use crate::subscription::{Subscribable, Subscription, Unsubscribe};
use crate::transport::Transport;
use live::LiveMode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Result of a one-shot call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fetched {
    pub data: Value,
    pub is_from_cache: bool,
}

impl Fetched {
    /// Decode `data` into a concrete type
    pub fn decode<R: DeserializeOwned>(&self) -> Result<R> {
        serde_json::from_value(self.data.clone()).map_err(BifrostError::from)
    }
}

/// Where a call is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Local,
    Remote,
}

impl Target {
    fn fetch_mode(self) -> AccessMode {
        match self {
            Target::Local => AccessMode::FetchClient,
            Target::Remote => AccessMode::FetchServer,
        }
    }

    fn live_mode(self) -> AccessMode {
        match self {
            Target::Local => AccessMode::UseClient,
            Target::Remote => AccessMode::UseServer,
        }
    }

    fn fetch_kind(self) -> LogKind {
        match self {
            Target::Local => LogKind::FetchClient,
            Target::Remote => LogKind::FetchServer,
        }
    }

    fn live_kind(self) -> LogKind {
        match self {
            Target::Local => LogKind::UseClient,
            Target::Remote => LogKind::UseServer,
        }
    }
}

/// A stream source produced by a function
pub(crate) enum StreamSource {
    Channel(Subscription<Value>),
    Subscribable(Arc<dyn Subscribable>),
}

/// Everything a handle needs to serve calls for one function
pub(crate) struct FnCore {
    pub(crate) name: String,
    pub(crate) callable: Callable,
    pub(crate) cache: Option<Arc<dyn CacheAdapter>>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) logger: Option<Arc<dyn CallLogger>>,
    pub(crate) host: Option<Arc<dyn ReactiveHost>>,
}

impl FnCore {
    pub(crate) fn log(&self, kind: LogKind, payload: Option<Value>, err: Option<&BifrostError>) {
        let mut record = LogRecord::new(self.name.clone(), kind);
        record.payload = payload;
        record.error = err.map(ToString::to_string);
        logger::emit(self.logger.as_ref(), record);
    }

    fn transport(&self) -> Result<&Arc<dyn Transport>> {
        self.transport.as_ref().ok_or_else(|| {
            BifrostError::ConfigError(format!(
                "{} was called remotely but no transport is configured",
                self.name
            ))
        })
    }

    pub(crate) fn host(&self) -> Result<Arc<dyn ReactiveHost>> {
        self.host.clone().ok_or_else(|| {
            BifrostError::ConfigError(format!(
                "{} needs a reactive host for live bindings; build inside a tokio runtime or set one explicitly",
                self.name
            ))
        })
    }

    /// Read a cache entry; adapter failures count as a miss
    pub(crate) async fn cache_read(&self, key: &str, opts: &CallOptions) -> Option<CacheEntry> {
        let cache = self.cache.as_ref().filter(|_| opts.cache_enabled())?;
        match cache.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Write a cache entry; adapter failures are logged and dropped
    pub(crate) async fn cache_write(&self, key: &str, value: Value, opts: &CallOptions) {
        let Some(cache) = self.cache.as_ref().filter(|_| opts.cache_enabled()) else {
            return;
        };
        if let Err(e) = cache.set(key, value).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }

    /// Write a cache entry in the background
    pub(crate) fn spawn_cache_write(self: &Arc<Self>, key: String, value: Value, opts: CallOptions) {
        if self.cache.is_none() || !opts.cache_enabled() {
            return;
        }

        let core = Arc::clone(self);
        let write = Box::pin(async move { core.cache_write(&key, value, &opts).await });

        match (&self.host, tokio::runtime::Handle::try_current()) {
            (Some(host), _) => host.schedule(write),
            (None, Ok(handle)) => {
                handle.spawn(write);
            }
            (None, Err(_)) => debug!("No runtime for background cache write of {}", self.name),
        }
    }

    /// Run the function where `target` says and wait for a plain value
    pub(crate) async fn invoke(&self, target: Target, arg: Value) -> Result<Value> {
        match target {
            Target::Local => registry::settle(&self.name, (self.callable)(arg)).await,
            Target::Remote => self.transport()?.send(&self.name, arg).await,
        }
    }

    /// Call the function and require a stream back
    pub(crate) fn open_stream(&self, arg: Value, method: &str) -> Result<StreamSource> {
        match (self.callable)(arg) {
            FnOutput::Channel(sub) => Ok(StreamSource::Channel(sub)),
            FnOutput::Subscribable(source) => Ok(StreamSource::Subscribable(source)),
            FnOutput::Ready(Err(e)) => Err(e),
            FnOutput::Pending(_) => {
                let err = BifrostError::ValidationError(format!(
                    "Problem in {}. The function {} is supposed to return a subscription channel but returned a future. Use fetch_client or use_client instead.",
                    method, self.name
                ));
                error!("{}", err);
                Err(err)
            }
            FnOutput::Ready(Ok(_)) => {
                let err = BifrostError::ValidationError(format!(
                    "{} may only be called on functions that return a subscription channel (dispose, on_data, on_error, next_data, next_error) or a subscribable (subscribe). {} returned a plain value.",
                    method, self.name
                ));
                error!("{}", err);
                Err(err)
            }
        }
    }

    async fn fetch(&self, target: Target, arg: Value, opts: CallOptions) -> Result<Fetched> {
        if target == Target::Remote {
            self.transport()?;
        }

        self.log(target.fetch_kind(), Some(arg.clone()), None);
        let key = policy::cache_key(target.fetch_mode(), &self.name, &arg);

        if let Some(window) = opts.use_cache_only_within {
            if let Some(entry) = self.cache_read(&key, &opts).await {
                if policy::is_fresh(entry.cached_at_ms, window) {
                    debug!("Serving {} from cache: {}", self.name, key);
                    return Ok(Fetched {
                        data: entry.value,
                        is_from_cache: true,
                    });
                }
            }
        }

        match self.invoke(target, arg).await {
            Ok(data) => {
                self.cache_write(&key, data.clone(), &opts).await;
                Ok(Fetched {
                    data,
                    is_from_cache: false,
                })
            }
            Err(e) => {
                error!("Failed to {} for {}: {}", target.fetch_mode(), self.name, e);
                Err(e)
            }
        }
    }
}

/// Every access method for one registered function
#[derive(Clone)]
pub struct FnHandle {
    core: Arc<FnCore>,
}

impl std::fmt::Debug for FnHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandle")
            .field("name", &self.core.name)
            .field("cache", &self.core.cache.is_some())
            .field("transport", &self.core.transport.is_some())
            .finish()
    }
}

impl FnHandle {
    pub(crate) fn new(core: FnCore) -> Self {
        Self {
            core: Arc::new(core),
        }
    }

    /// Name of the wrapped function
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Call the function in-process
    pub async fn fetch_client(&self, arg: impl Serialize, opts: CallOptions) -> Result<Fetched> {
        let arg = serde_json::to_value(arg)?;
        self.core.fetch(Target::Local, arg, opts).await
    }

    /// Call the function through the configured transport
    pub async fn fetch_server(&self, arg: impl Serialize, opts: CallOptions) -> Result<Fetched> {
        let arg = serde_json::to_value(arg)?;
        self.core.fetch(Target::Remote, arg, opts).await
    }

    /// Bind to the in-process function; re-runs whenever `deps` change
    pub fn use_client(
        &self,
        arg: impl Serialize,
        deps: Vec<Value>,
        opts: CallOptions,
    ) -> Result<LiveBinding> {
        self.live(LiveMode::Call(Target::Local), arg, deps, opts)
    }

    /// Bind to the remote function; re-runs whenever `deps` change
    pub fn use_server(
        &self,
        arg: impl Serialize,
        deps: Vec<Value>,
        opts: CallOptions,
    ) -> Result<LiveBinding> {
        self.core.transport()?;
        self.live(LiveMode::Call(Target::Remote), arg, deps, opts)
    }

    /// Bind to the stream the function returns
    pub fn use_client_subscription(
        &self,
        arg: impl Serialize,
        deps: Vec<Value>,
        opts: CallOptions,
    ) -> Result<LiveBinding> {
        self.live(LiveMode::Subscription, arg, deps, opts)
    }

    /// Callback-style access to the stream the function returns
    pub fn client_subscription(&self, arg: impl Serialize, opts: CallOptions) -> Result<ClientSubscription> {
        Ok(ClientSubscription {
            core: Arc::clone(&self.core),
            arg: serde_json::to_value(arg)?,
            opts,
        })
    }

    fn live(
        &self,
        mode: LiveMode,
        arg: impl Serialize,
        deps: Vec<Value>,
        opts: CallOptions,
    ) -> Result<LiveBinding> {
        let host = self.core.host()?;
        let arg = serde_json::to_value(arg)?;
        Ok(LiveBinding::start(Arc::clone(&self.core), host, mode, arg, deps, opts))
    }
}

/// Stream access that delivers values to a callback
pub struct ClientSubscription {
    core: Arc<FnCore>,
    arg: Value,
    opts: CallOptions,
}

impl ClientSubscription {
    /// Start delivering values to `on_value`.
    ///
    /// A cached value, if any, is delivered first with `is_from_cache` set.
    /// Functions that do not return a stream are rejected before anything is
    /// delivered.
    pub async fn subscribe<F>(&self, on_value: F) -> Result<Unsubscribe>
    where
        F: Fn(Fetched) + Send + Sync + 'static,
    {
        let core = &self.core;
        let source = core.open_stream(self.arg.clone(), "client_subscription")?;
        let on_value = Arc::new(on_value);

        let key = policy::cache_key(AccessMode::ClientSubscription, &core.name, &self.arg);
        if let Some(entry) = core.cache_read(&key, &self.opts).await {
            on_value(Fetched {
                data: entry.value,
                is_from_cache: true,
            });
        }

        let deliver = {
            let core = Arc::clone(core);
            let opts = self.opts;
            move |value: Value| {
                core.spawn_cache_write(key.clone(), value.clone(), opts);
                core.log(LogKind::ClientSubscriptionData, Some(value.clone()), None);
                on_value(Fetched {
                    data: value,
                    is_from_cache: false,
                });
            }
        };

        match source {
            StreamSource::Channel(sub) => {
                sub.on_data(move |value: &Value| deliver(value.clone()));

                let err_core = Arc::clone(core);
                sub.on_error(move |e| {
                    error!("Subscription error in {}: {}", err_core.name, e);
                    err_core.log(
                        LogKind::ClientSubscriptionError,
                        None,
                        Some(&BifrostError::from(e.clone())),
                    );
                });
                Ok(sub.disposer())
            }
            StreamSource::Subscribable(source) => Ok(source.subscribe(Box::new(deliver))),
        }
    }
}
