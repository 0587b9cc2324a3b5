//! Instance construction
//!
//! [`Bifrost::builder`] takes a registry plus optional cache, transport,
//! logger and reactive host, and produces one [`FnHandle`] per registered
//! function, in registration order.

use crate::cache::CacheAdapter;
use crate::error::{BifrostError, Result};
use crate::invoke::{FnCore, FnHandle};
use crate::logger::CallLogger;
use crate::reactive::{ReactiveHost, TokioHost};
use crate::registry::Registry;
use crate::transport::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A set of wrapped functions sharing one configuration
pub struct Bifrost {
    registry: Arc<Registry>,
    handles: Vec<FnHandle>,
    index: HashMap<String, usize>,
}

impl Bifrost {
    /// Start building an instance over `registry`
    pub fn builder(registry: impl Into<Arc<Registry>>) -> BifrostBuilder {
        BifrostBuilder {
            registry: registry.into(),
            cache: None,
            transport: None,
            logger: None,
            host: None,
        }
    }

    /// Handle for `name`
    pub fn get(&self, name: &str) -> Option<&FnHandle> {
        self.index.get(name).map(|&i| &self.handles[i])
    }

    /// Handle for `name`, or an error naming the missing function
    pub fn handle(&self, name: &str) -> Result<&FnHandle> {
        self.get(name)
            .ok_or_else(|| BifrostError::UnknownFunction(name.to_string()))
    }

    /// Function names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(FnHandle::name)
    }

    /// Handles in registration order
    pub fn iter(&self) -> impl Iterator<Item = &FnHandle> {
        self.handles.iter()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// The registry the instance was built from
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl std::fmt::Debug for Bifrost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bifrost")
            .field("functions", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`Bifrost`]
pub struct BifrostBuilder {
    registry: Arc<Registry>,
    cache: Option<Arc<dyn CacheAdapter>>,
    transport: Option<Arc<dyn Transport>>,
    logger: Option<Arc<dyn CallLogger>>,
    host: Option<Arc<dyn ReactiveHost>>,
}

impl BifrostBuilder {
    /// Cache results through `cache`
    pub fn cache(mut self, cache: Arc<dyn CacheAdapter>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Send remote calls through `transport`
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Report calls to `logger`
    pub fn logger(mut self, logger: Arc<dyn CallLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Run live-binding effects on `host`.
    ///
    /// Without one, a [`TokioHost`] for the current runtime is used when
    /// building inside a runtime.
    pub fn host(mut self, host: Arc<dyn ReactiveHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Wrap every registered function
    pub fn build(self) -> Bifrost {
        let host = self.host.or_else(|| match TokioHost::try_current() {
            Ok(host) => Some(Arc::new(host) as Arc<dyn ReactiveHost>),
            Err(e) => {
                debug!("Building without a reactive host: {}", e);
                None
            }
        });

        let mut handles = Vec::with_capacity(self.registry.len());
        let mut index = HashMap::with_capacity(self.registry.len());

        for function in self.registry.iter() {
            index.insert(function.name().to_string(), handles.len());
            handles.push(FnHandle::new(FnCore {
                name: function.name().to_string(),
                callable: function.callable(),
                cache: self.cache.clone(),
                transport: self.transport.clone(),
                logger: self.logger.clone(),
                host: host.clone(),
            }));
        }

        info!(
            "Built bifrost instance with {} functions (cache: {}, transport: {})",
            handles.len(),
            self.cache.is_some(),
            self.transport.is_some()
        );

        Bifrost {
            registry: self.registry,
            handles,
            index,
        }
    }
}
