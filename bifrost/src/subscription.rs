//! Subscription channels
//!
//! A [`Subscription`] is an ordered, deduplicated stream of values with error
//! delivery and replay of the last value to late listeners. Producers push with
//! [`Subscription::next_data`] and [`Subscription::next_error`]; consumers attach
//! with [`Subscription::on_data`] and [`Subscription::on_error`] and detach
//! everything at once with [`Subscription::dispose`].
//!
//! [`Subscribable`] is the narrower alternative shape: a single `subscribe`
//! capability returning an [`Unsubscribe`] handle.

use crate::error::FnError;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error};

type DataListener<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ErrorListener = Arc<dyn Fn(&FnError) + Send + Sync>;
type Release = Box<dyn FnOnce() + Send>;

/// Callback handed to [`Subscribable::subscribe`]
pub type ValueCallback = Box<dyn Fn(Value) + Send + Sync>;

struct ChannelState<T> {
    current: Option<T>,
    last_token: Option<u64>,
    data_listeners: Vec<DataListener<T>>,
    error_listeners: Vec<ErrorListener>,
    disposed: bool,
}

struct Inner<T> {
    state: Mutex<ChannelState<T>>,
    release: Mutex<Option<Release>>,
}

/// Disposable event stream with replay-on-subscribe
pub struct Subscription<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Subscription")
            .field("has_value", &state.current.is_some())
            .field("last_token", &state.last_token)
            .field("data_listeners", &state.data_listeners.len())
            .field("error_listeners", &state.error_listeners.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl<T> Subscription<T> {
    fn lock(&self) -> MutexGuard<'_, ChannelState<T>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Subscription<T> {
    /// Create a channel that runs `release` once when disposed
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ChannelState {
                    current: None,
                    last_token: None,
                    data_listeners: Vec::new(),
                    error_listeners: Vec::new(),
                    disposed: false,
                }),
                release: Mutex::new(Some(Box::new(release))),
            }),
        }
    }

    /// Create a channel with nothing to release
    pub fn detached() -> Self {
        Self::new(|| {})
    }

    /// Push a value. Returns `true` when it was emitted to listeners.
    pub fn next_data(&self, value: T) -> bool {
        self.emit(value, None)
    }

    /// Push a value tagged with a sequence token.
    ///
    /// The value is dropped unless `token` is strictly greater than the last
    /// token that was accepted.
    pub fn next_data_with(&self, value: T, token: u64) -> bool {
        self.emit(value, Some(token))
    }

    fn emit(&self, value: T, token: Option<u64>) -> bool {
        let listeners = {
            let mut state = self.lock();
            if state.disposed {
                return false;
            }

            let sequence_ok = token.is_none() || token > state.last_token;
            if !sequence_ok || state.current.as_ref() == Some(&value) {
                return false;
            }

            state.current = Some(value.clone());
            if token.is_some() {
                state.last_token = token;
            }
            state.data_listeners.clone()
        };

        // Listeners run outside the lock so they may call back into the channel
        for listener in &listeners {
            listener(&value);
        }
        true
    }

    /// Push an error to every error listener. The current value is untouched.
    pub fn next_error(&self, err: FnError) {
        let listeners = {
            let state = self.lock();
            if state.disposed {
                return;
            }
            state.error_listeners.clone()
        };

        for listener in &listeners {
            listener(&err);
        }
    }

    /// Attach a data listener, replaying the current value if there is one
    pub fn on_data(&self, listener: impl Fn(&T) + Send + Sync + 'static) {
        let listener: DataListener<T> = Arc::new(listener);
        let replay = {
            let mut state = self.lock();
            if state.disposed {
                return;
            }
            state.data_listeners.push(Arc::clone(&listener));
            state.current.clone()
        };

        if let Some(value) = replay {
            listener(&value);
        }
    }

    /// Attach an error listener. Errors are not latched, so nothing is replayed.
    pub fn on_error(&self, listener: impl Fn(&FnError) + Send + Sync + 'static) {
        let mut state = self.lock();
        if !state.disposed {
            state.error_listeners.push(Arc::new(listener));
        }
    }

    /// Remove all listeners and release the underlying resource.
    ///
    /// Safe to call more than once; the release callback runs at most once and
    /// a panic inside it is logged, never propagated.
    pub fn dispose(&self) {
        {
            let mut state = self.lock();
            if state.disposed {
                debug!("Subscription already disposed");
                return;
            }
            state.disposed = true;
            state.data_listeners.clear();
            state.error_listeners.clear();
        }

        let release = self
            .inner
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(release) = release {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(release)) {
                error!("Unable to dispose subscription: {}", panic_message(&panic));
            }
        }
    }

    /// Whether [`dispose`](Self::dispose) has run
    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// Last emitted value
    pub fn current(&self) -> Option<T> {
        self.lock().current.clone()
    }

    /// Handle that disposes this channel when invoked
    pub fn disposer(&self) -> Unsubscribe {
        let sub = self.clone();
        Unsubscribe::new(move || sub.dispose())
    }

    fn downgrade(&self) -> Weak<Inner<T>> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<Inner<T>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

impl<T: Serialize + Clone + PartialEq + Send + Sync + 'static> Subscription<T> {
    /// Bridge a typed channel onto a JSON channel.
    ///
    /// Values are serialized as they arrive, errors are forwarded, and disposing
    /// the JSON side disposes this channel.
    pub fn into_json(self) -> Subscription<Value> {
        let typed = self.clone();
        let json = Subscription::new(move || typed.dispose());

        let target = json.downgrade();
        self.on_data(move |value| {
            let Some(json) = Subscription::upgrade(&target) else {
                return;
            };
            match serde_json::to_value(value) {
                Ok(value) => {
                    json.next_data(value);
                }
                Err(e) => json.next_error(FnError::from(e)),
            }
        });

        let target = json.downgrade();
        self.on_error(move |err| {
            if let Some(json) = Subscription::upgrade(&target) {
                json.next_error(err.clone());
            }
        });

        json
    }
}

/// Narrow subscription contract: a single `subscribe` capability
pub trait Subscribable: Send + Sync {
    /// Start delivering values to `on_value` until the returned handle is used
    fn subscribe(&self, on_value: ValueCallback) -> Unsubscribe;
}

/// One-shot detach handle
pub struct Unsubscribe {
    action: Mutex<Option<Release>>,
}

impl Unsubscribe {
    /// Wrap a detach action
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// Handle with nothing to detach
    pub fn noop() -> Self {
        Self {
            action: Mutex::new(None),
        }
    }

    /// Run the detach action. Later calls do nothing.
    pub fn unsubscribe(&self) {
        let action = self
            .action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(action) = action {
            action();
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self
            .action
            .lock()
            .map(|a| a.is_some())
            .unwrap_or(false);
        f.debug_struct("Unsubscribe").field("pending", &pending).finish()
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
