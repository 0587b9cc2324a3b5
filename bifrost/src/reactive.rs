//! Reactive host abstraction
//!
//! Live bindings never run their side effects inline. They hand each effect
//! to a [`ReactiveHost`], which decides when it runs, and ask the host for a
//! re-render whenever their state changes.
//!
//! - [`TokioHost`] spawns effects on a tokio runtime.
//! - [`ManualHost`] queues them so the caller controls exactly when and in
//!   which order they run.

use crate::error::{BifrostError, Result};
use futures::future::{join_all, BoxFuture};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::Notify;

/// Deferred side effect
pub type Effect = BoxFuture<'static, ()>;

/// Scheduler and re-render hook for live bindings
pub trait ReactiveHost: Send + Sync {
    /// Run `effect` after the current render
    fn schedule(&self, effect: Effect);

    /// Ask for a re-render because observable state changed
    fn request_render(&self);
}

/// Host that spawns effects on a tokio runtime
pub struct TokioHost {
    handle: Handle,
    renders: AtomicU64,
    notify: Notify,
}

impl TokioHost {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            renders: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Host bound to the runtime this is called from
    pub fn try_current() -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| {
            BifrostError::ConfigError(format!("no tokio runtime for reactive host: {}", e))
        })?;
        Ok(Self::new(handle))
    }

    /// Number of render requests so far
    pub fn render_count(&self) -> u64 {
        self.renders.load(Ordering::SeqCst)
    }

    /// Wait for the next render request.
    ///
    /// Returns at once if a request arrived since the previous call.
    pub async fn rendered(&self) {
        self.notify.notified().await;
    }
}

impl ReactiveHost for TokioHost {
    fn schedule(&self, effect: Effect) {
        self.handle.spawn(effect);
    }

    fn request_render(&self) {
        self.renders.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

/// Host that queues effects until the caller runs them
#[derive(Default)]
pub struct ManualHost {
    effects: Mutex<VecDeque<Effect>>,
    renders: AtomicU64,
}

impl ManualHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every queued effect in scheduling order
    pub fn take_effects(&self) -> Vec<Effect> {
        self.effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    /// Number of queued effects
    pub fn pending(&self) -> usize {
        self.effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run queued effects, including ones they schedule, until none remain
    pub async fn run_until_idle(&self) {
        loop {
            let batch = self.take_effects();
            if batch.is_empty() {
                break;
            }
            join_all(batch).await;
        }
    }

    /// Number of render requests so far
    pub fn render_count(&self) -> u64 {
        self.renders.load(Ordering::SeqCst)
    }
}

impl ReactiveHost for ManualHost {
    fn schedule(&self, effect: Effect) {
        self.effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(effect);
    }

    fn request_render(&self) {
        self.renders.fetch_add(1, Ordering::SeqCst);
    }
}
