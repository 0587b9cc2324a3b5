//! Live bindings
//!
//! A [`LiveBinding`] keeps a [`CallState`] up to date for one function and
//! one argument. Each change of its dependency list starts a new cycle; the
//! cycle counter makes sure a slow, superseded cycle can never overwrite the
//! state a newer one published.

use super::{FnCore, StreamSource, Target};
use crate::error::{BifrostError, Result};
use crate::logger::LogKind;
use crate::policy::{self, AccessMode, CallOptions};
use crate::reactive::ReactiveHost;
use crate::subscription::Unsubscribe;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::watch;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Observable state of a live binding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallState {
    pub data: Option<Value>,
    pub is_loading: bool,
    pub error: Option<BifrostError>,
    pub is_from_cache: bool,
}

impl CallState {
    fn loading() -> Self {
        Self {
            is_loading: true,
            ..Default::default()
        }
    }

    fn cached(data: Value) -> Self {
        Self {
            data: Some(data),
            is_loading: false,
            error: None,
            is_from_cache: true,
        }
    }

    fn loaded(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    fn failed(error: BifrostError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    /// Decode `data` into a concrete type, if there is any
    pub fn decode<R: DeserializeOwned>(&self) -> Option<Result<R>> {
        self.data
            .clone()
            .map(|data| serde_json::from_value(data).map_err(BifrostError::from))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LiveMode {
    Call(Target),
    Subscription,
}

struct Shared {
    id: Uuid,
    core: Arc<FnCore>,
    host: Arc<dyn ReactiveHost>,
    mode: LiveMode,
    opts: CallOptions,
    state: watch::Sender<CallState>,
    cycle: AtomicU64,
    torn_down: AtomicBool,
    detach: Mutex<Option<Unsubscribe>>,
}

impl Shared {
    fn is_current(&self, cycle: u64) -> bool {
        !self.torn_down.load(Ordering::SeqCst) && self.cycle.load(Ordering::SeqCst) == cycle
    }

    /// Publish `state` if `cycle` is still the live one.
    ///
    /// The check runs under the watch lock, the same lock `refresh` and
    /// `dispose` take to move the cycle on, so a superseded result can never
    /// land after a newer reset.
    fn publish(&self, cycle: u64, state: CallState) -> bool {
        let published = self.state.send_if_modified(|current| {
            if !self.is_current(cycle) {
                return false;
            }
            *current = state;
            true
        });

        if published {
            self.host.request_render();
        } else {
            debug!(
                "Discarding result of superseded cycle {} for {} ({})",
                cycle, self.core.name, self.id
            );
        }
        published
    }

    /// Move to a new cycle and reset to loading in one step
    fn begin_cycle(&self) -> u64 {
        let mut cycle = 0;
        self.state.send_modify(|current| {
            cycle = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;
            *current = CallState::loading();
        });
        cycle
    }

    /// Mark the binding torn down; returns false if it already was
    fn tear_down(&self) -> bool {
        let mut first = false;
        self.state.send_if_modified(|_| {
            first = !self.torn_down.swap(true, Ordering::SeqCst);
            false
        });
        first
    }

    /// Keep `detach` for the current cycle, or run it now if the cycle is gone
    fn install_detach(&self, cycle: u64, detach: Unsubscribe) {
        let mut slot = self.detach.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_current(cycle) {
            if let Some(previous) = slot.replace(detach) {
                previous.unsubscribe();
            }
        } else {
            drop(slot);
            detach.unsubscribe();
        }
    }

    fn release_detach(&self) {
        let detach = self
            .detach
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(detach) = detach {
            detach.unsubscribe();
        }
    }

    fn on_stream_value(self: &Arc<Self>, cycle: u64, key: &str, value: Value) {
        if !self.is_current(cycle) {
            return;
        }
        self.core
            .spawn_cache_write(key.to_string(), value.clone(), self.opts);
        self.core
            .log(LogKind::SubscriptionData, Some(value.clone()), None);
        self.publish(cycle, CallState::loaded(value));
    }
}

/// A self-refreshing view of one function's result
pub struct LiveBinding {
    shared: Arc<Shared>,
    arg: Value,
    deps: Option<Vec<Value>>,
}

impl std::fmt::Debug for LiveBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveBinding")
            .field("id", &self.shared.id)
            .field("fn_name", &self.shared.core.name)
            .field("mode", &self.shared.mode)
            .field("cycle", &self.cycle())
            .finish()
    }
}

impl LiveBinding {
    pub(crate) fn start(
        core: Arc<FnCore>,
        host: Arc<dyn ReactiveHost>,
        mode: LiveMode,
        arg: Value,
        deps: Vec<Value>,
        opts: CallOptions,
    ) -> Self {
        let (state, _) = watch::channel(CallState::loading());
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            core,
            host,
            mode,
            opts,
            state,
            cycle: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
            detach: Mutex::new(None),
        });

        let mut binding = Self {
            shared,
            arg,
            deps: None,
        };
        binding.refresh(deps);
        binding
    }

    /// Unique id of this binding
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Name of the bound function
    pub fn fn_name(&self) -> &str {
        &self.shared.core.name
    }

    /// Current cycle number; the first cycle is 1
    pub fn cycle(&self) -> u64 {
        self.shared.cycle.load(Ordering::SeqCst)
    }

    /// Snapshot of the current state
    pub fn state(&self) -> CallState {
        self.shared.state.borrow().clone()
    }

    /// Receiver that sees every state change
    pub fn watch(&self) -> watch::Receiver<CallState> {
        self.shared.state.subscribe()
    }

    /// Re-render with a possibly new argument.
    ///
    /// A new cycle starts only when `deps` differ from the previous render;
    /// otherwise the argument is ignored. Returns whether a cycle started.
    pub fn update(&mut self, arg: impl Serialize, deps: Vec<Value>) -> Result<bool> {
        if self.is_disposed() || self.deps.as_ref() == Some(&deps) {
            return Ok(false);
        }
        self.arg = serde_json::to_value(arg)?;
        Ok(self.refresh(deps))
    }

    /// Whether the binding has been torn down
    pub fn is_disposed(&self) -> bool {
        self.shared.torn_down.load(Ordering::SeqCst)
    }

    /// Tear the binding down. Later results are discarded and any open
    /// stream is released. Calling it again does nothing.
    pub fn dispose(&self) {
        if !self.shared.tear_down() {
            return;
        }
        debug!("Disposing live binding {} for {}", self.shared.id, self.shared.core.name);
        self.shared.release_detach();
    }

    fn refresh(&mut self, deps: Vec<Value>) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.deps = Some(deps);

        let shared = &self.shared;
        let cycle = shared.begin_cycle();
        shared.release_detach();

        let arg = self.arg.clone();
        let effect = match shared.mode {
            LiveMode::Call(target) => {
                Box::pin(run_call(Arc::clone(shared), cycle, target, arg)) as crate::reactive::Effect
            }
            LiveMode::Subscription => Box::pin(run_stream(Arc::clone(shared), cycle, arg)),
        };
        shared.host.schedule(effect);
        true
    }
}

impl Drop for LiveBinding {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn run_call(shared: Arc<Shared>, cycle: u64, target: Target, arg: Value) {
    let core = &shared.core;
    let opts = shared.opts;
    core.log(target.live_kind(), Some(arg.clone()), None);

    let key = policy::cache_key(target.live_mode(), &core.name, &arg);
    if let Some(entry) = core.cache_read(&key, &opts).await {
        let fresh = opts
            .use_cache_only_within
            .map(|window| policy::is_fresh(entry.cached_at_ms, window))
            .unwrap_or(false);
        shared.publish(cycle, CallState::cached(entry.value));
        if fresh {
            debug!("Serving {} from cache: {}", core.name, key);
            return;
        }
    }

    match core.invoke(target, arg).await {
        Ok(data) => {
            shared.publish(cycle, CallState::loaded(data.clone()));
            core.spawn_cache_write(key, data, opts);
        }
        Err(e) => {
            error!("Failed to {} for {}: {}", target.live_mode(), core.name, e);
            shared.publish(cycle, CallState::failed(e));
        }
    }
}

async fn run_stream(shared: Arc<Shared>, cycle: u64, arg: Value) {
    let core = &shared.core;
    let opts = shared.opts;

    let key = policy::cache_key(AccessMode::UseClientSubscription, &core.name, &arg);
    if let Some(entry) = core.cache_read(&key, &opts).await {
        shared.publish(cycle, CallState::cached(entry.value));
    }

    core.log(LogKind::SubscriptionSetup, Some(arg.clone()), None);
    let source = match core.open_stream(arg, "use_client_subscription") {
        Ok(source) => source,
        Err(e) => {
            shared.publish(cycle, CallState::failed(e));
            return;
        }
    };

    let weak: Weak<Shared> = Arc::downgrade(&shared);
    let on_value = move |value: Value| {
        if let Some(shared) = weak.upgrade() {
            shared.on_stream_value(cycle, &key, value);
        }
    };

    let detach = match source {
        StreamSource::Channel(sub) => {
            sub.on_data(move |value: &Value| on_value(value.clone()));

            let weak = Arc::downgrade(&shared);
            sub.on_error(move |e| {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                warn!("Subscription error in {}: {}", shared.core.name, e);
                shared.core.log(
                    LogKind::SubscriptionError,
                    None,
                    Some(&BifrostError::from(e.clone())),
                );
            });
            sub.disposer()
        }
        StreamSource::Subscribable(source) => source.subscribe(Box::new(on_value)),
    };

    shared.install_detach(cycle, detach);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ManualHost;
    use crate::registry::Registry;
    use serde_json::json;
    use std::time::Duration;

    fn binding(host: &Arc<ManualHost>, registry: &Registry, name: &str, deps: Vec<Value>) -> LiveBinding {
        let core = FnCore {
            name: name.to_string(),
            callable: registry.get(name).unwrap().callable(),
            cache: None,
            transport: None,
            logger: None,
            host: Some(Arc::clone(host) as Arc<dyn ReactiveHost>),
        };
        LiveBinding::start(
            Arc::new(core),
            Arc::clone(host) as Arc<dyn ReactiveHost>,
            LiveMode::Call(Target::Local),
            json!(1),
            deps,
            CallOptions::new(),
        )
    }

    #[tokio::test]
    async fn test_first_render_is_loading() {
        let host = Arc::new(ManualHost::new());
        let registry = Registry::new().sync_function("inc", |n: i64| Ok(n + 1));
        let binding = binding(&host, &registry, "inc", vec![]);

        assert_eq!(binding.state(), CallState::loading());
        assert_eq!(binding.cycle(), 1);
        assert_eq!(host.pending(), 1);

        host.run_until_idle().await;
        assert_eq!(binding.state().data, Some(json!(2)));
        assert!(!binding.state().is_loading);
        assert_eq!(binding.state().decode::<i64>().unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_same_deps_do_not_restart() {
        let host = Arc::new(ManualHost::new());
        let registry = Registry::new().sync_function("inc", |n: i64| Ok(n + 1));
        let mut binding = binding(&host, &registry, "inc", vec![json!("a")]);
        host.run_until_idle().await;

        assert!(!binding.update(5, vec![json!("a")]).unwrap());
        assert_eq!(host.pending(), 0);
        assert_eq!(binding.cycle(), 1);

        assert!(binding.update(5, vec![json!("b")]).unwrap());
        assert_eq!(binding.cycle(), 2);
        host.run_until_idle().await;
        assert_eq!(binding.state().data, Some(json!(6)));
    }

    #[tokio::test]
    async fn test_disposed_binding_ignores_results() {
        let host = Arc::new(ManualHost::new());
        let registry = Registry::new().sync_function("inc", |n: i64| Ok(n + 1));
        let mut binding = binding(&host, &registry, "inc", vec![]);

        binding.dispose();
        binding.dispose();
        host.run_until_idle().await;

        assert!(binding.is_disposed());
        assert!(binding.state().is_loading);
        assert!(!binding.update(2, vec![json!(1)]).unwrap());
    }

    #[test]
    fn test_superseded_publish_waits_behind_new_cycle() {
        let host = Arc::new(ManualHost::new());
        let registry = Registry::new().sync_function("inc", |n: i64| Ok(n + 1));
        let mut binding = binding(&host, &registry, "inc", vec![json!("a")]);
        let shared = Arc::clone(&binding.shared);

        // Hold the state lock so the cycle 1 result and the cycle 2 reset
        // both queue up behind it
        let held = shared.state.borrow();
        std::thread::scope(|scope| {
            let stale = scope.spawn(|| shared.publish(1, CallState::loaded(json!("stale"))));
            std::thread::sleep(Duration::from_millis(50));
            let fresh = scope.spawn(|| binding.update(0, vec![json!("b")]).unwrap());
            std::thread::sleep(Duration::from_millis(50));
            drop(held);

            stale.join().unwrap();
            assert!(fresh.join().unwrap());
        });

        assert_eq!(binding.cycle(), 2);
        assert_eq!(binding.state(), CallState::loading());

        futures::executor::block_on(host.run_until_idle());
        assert_eq!(binding.state().data, Some(json!(1)));
    }

    #[test]
    fn test_publish_after_teardown_is_discarded() {
        let host = Arc::new(ManualHost::new());
        let registry = Registry::new().sync_function("inc", |n: i64| Ok(n + 1));
        let binding = binding(&host, &registry, "inc", vec![]);

        assert!(binding.shared.publish(1, CallState::loaded(json!(7))));
        binding.dispose();
        assert!(!binding.shared.publish(1, CallState::loaded(json!(8))));
        assert_eq!(binding.state().data, Some(json!(7)));
    }

    #[test]
    fn test_error_state() {
        let state = CallState::failed(BifrostError::ValidationError("x".into()));
        assert!(state.data.is_none());
        assert!(!state.is_loading);
        assert!(state.decode::<i64>().is_none());
    }
}
