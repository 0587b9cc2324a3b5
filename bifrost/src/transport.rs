//! Remote call transports
//!
//! A [`Transport`] delivers `(name, payload)` to wherever the function really
//! runs and hands back its JSON result. Failures are returned unchanged so
//! callers see the remote error as-is.

use crate::error::{BifrostError, FnError, Result};
use crate::registry::{CallContext, Registry};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Carries remote calls
#[async_trait]
pub trait Transport: Send + Sync {
    /// Invoke `fn_name` remotely with `payload`
    async fn send(&self, fn_name: &str, payload: Value) -> Result<Value>;
}

/// Transport that answers from an in-process registry.
///
/// With [`Loopback::with_auth`] it also runs the access guards the HTTP
/// surface would, which makes it a stand-in for a real server in tests.
pub struct Loopback {
    registry: Arc<Registry>,
    auth: Option<(String, CallContext)>,
}

impl Loopback {
    /// Serve calls straight from `registry`
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            auth: None,
        }
    }

    /// Require a guard under `auth_key` and run it against `ctx`
    pub fn with_auth(mut self, auth_key: impl Into<String>, ctx: CallContext) -> Self {
        self.auth = Some((auth_key.into(), ctx));
        self
    }
}

#[async_trait]
impl Transport for Loopback {
    async fn send(&self, fn_name: &str, payload: Value) -> Result<Value> {
        debug!("Loopback call: {}", fn_name);

        if let Some((auth_key, ctx)) = &self.auth {
            let function = self
                .registry
                .get(fn_name)
                .ok_or_else(|| BifrostError::UnknownFunction(fn_name.to_string()))?;

            let guard = function.guard(auth_key).ok_or_else(|| {
                FnError::with_status(
                    401,
                    format!("No auth defined for this function. AuthKey: {}", auth_key),
                )
            })?;
            guard(ctx.clone()).await?;
        }

        self.registry.invoke(fn_name, payload).await
    }
}

/// Transport backed by an async closure
pub struct FnTransport<F> {
    send: F,
}

/// Build a transport from `|fn_name, payload| async { .. }`
pub fn transport_fn<F, Fut>(send: F) -> FnTransport<F>
where
    F: Fn(String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    FnTransport { send }
}

#[async_trait]
impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn send(&self, fn_name: &str, payload: Value) -> Result<Value> {
        (self.send)(fn_name.to_string(), payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Arc<Registry> {
        let registry = Registry::new()
            .sync_function("echo", |v: Value| Ok(v))
            .sync_function("open", |v: Value| Ok(v))
            .guard("echo", "web", |ctx: CallContext| async move {
                match ctx.header("authorization") {
                    Some("Bearer good") => Ok(()),
                    _ => Err(FnError::with_status(401, "bad token")),
                }
            })
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_loopback_invokes_registry() {
        let transport = Loopback::new(registry());
        let result = transport.send("echo", json!({"a": 1})).await.unwrap();
        assert_eq!(result, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_loopback_runs_guards() {
        let ctx = CallContext::new().with_header("Authorization", "Bearer good");
        let transport = Loopback::new(registry()).with_auth("web", ctx);
        assert_eq!(transport.send("echo", json!(1)).await.unwrap(), json!(1));

        let ctx = CallContext::new().with_header("Authorization", "Bearer bad");
        let transport = Loopback::new(registry()).with_auth("web", ctx);
        let err = transport.send("echo", json!(1)).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "bad token");
    }

    #[tokio::test]
    async fn test_loopback_rejects_unguarded_function() {
        let transport = Loopback::new(registry()).with_auth("web", CallContext::new());
        let err = transport.send("open", json!(1)).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("AuthKey: web"));
    }

    #[tokio::test]
    async fn test_transport_fn() {
        let transport = transport_fn(|name, payload| async move {
            Ok(json!({"called": name, "with": payload}))
        });
        let result = transport.send("f", json!(2)).await.unwrap();
        assert_eq!(result, json!({"called": "f", "with": 2}));
    }
}
