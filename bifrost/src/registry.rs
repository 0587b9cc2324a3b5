//! Function registry
//!
//! A [`Registry`] is an insertion-ordered set of named functions. Every
//! function takes one JSON argument and produces an [`FnOutput`]; the typed
//! helpers take care of decoding the argument and encoding the result.
//!
//! Each function may also carry access guards, stored under an auth key. The
//! HTTP surface only exposes functions guarded under the key it was
//! configured with.

use crate::error::{BifrostError, FnError, Result};
use crate::subscription::{Subscribable, Subscription};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Boxed eventual result of a function call
pub type FnFuture = BoxFuture<'static, Result<Value>>;

/// Type-erased registered function
pub type Callable = Arc<dyn Fn(Value) -> FnOutput + Send + Sync>;

/// Boxed eventual outcome of an access guard
pub type GuardFuture = BoxFuture<'static, std::result::Result<(), FnError>>;

/// Access check run before a function is served over HTTP
pub type AccessGuard = Arc<dyn Fn(CallContext) -> GuardFuture + Send + Sync>;

/// What a registered function hands back, decided when it returns
pub enum FnOutput {
    /// Settled value
    Ready(Result<Value>),

    /// Value that is still being computed
    Pending(FnFuture),

    /// Full subscription channel
    Channel(Subscription<Value>),

    /// Narrow `subscribe`-only source
    Subscribable(Arc<dyn Subscribable>),
}

impl FnOutput {
    /// Short name of the variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            FnOutput::Ready(_) => "value",
            FnOutput::Pending(_) => "future",
            FnOutput::Channel(_) => "subscription channel",
            FnOutput::Subscribable(_) => "subscribable",
        }
    }

    /// Whether the output is something that can be sent as plain JSON
    pub fn is_plain(&self) -> bool {
        matches!(self, FnOutput::Ready(_) | FnOutput::Pending(_))
    }
}

impl std::fmt::Debug for FnOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FnOutput::{}", self.kind())
    }
}

/// Request details handed to access guards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    headers: HashMap<String, String>,
}

impl CallContext {
    /// Empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header; names are case-insensitive
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    /// Add a header in place
    pub fn insert_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Look up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// A named function plus its guards
pub struct RegisteredFn {
    name: String,
    callable: Callable,
    guards: HashMap<String, AccessGuard>,
}

impl RegisteredFn {
    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the callable
    pub fn callable(&self) -> Callable {
        Arc::clone(&self.callable)
    }

    /// Run the function
    pub fn call(&self, arg: Value) -> FnOutput {
        (self.callable)(arg)
    }

    /// Guard registered under `auth_key`
    pub fn guard(&self, auth_key: &str) -> Option<&AccessGuard> {
        self.guards.get(auth_key)
    }

    /// Auth keys this function is guarded under
    pub fn auth_keys(&self) -> impl Iterator<Item = &str> {
        self.guards.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for RegisteredFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredFn")
            .field("name", &self.name)
            .field("guards", &self.guards.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Insertion-ordered mapping from name to function
#[derive(Default)]
pub struct Registry {
    functions: Vec<RegisteredFn>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an untyped function.
    ///
    /// Registering a name twice replaces the callable and keeps its position
    /// and guards.
    pub fn raw<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> FnOutput + Send + Sync + 'static,
    {
        let name = name.into();
        let callable: Callable = Arc::new(f);

        match self.index.get(&name) {
            Some(&i) => self.functions[i].callable = callable,
            None => {
                self.index.insert(name.clone(), self.functions.len());
                self.functions.push(RegisteredFn {
                    name,
                    callable,
                    guards: HashMap::new(),
                });
            }
        }
        self
    }

    /// Register an async function with a typed argument and result
    pub fn function<P, R, F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        P: DeserializeOwned,
        R: Serialize,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, FnError>> + Send + 'static,
    {
        let name = name.into();
        let fn_name = name.clone();
        self.raw(name, move |arg| {
            let param = match decode_arg::<P>(&fn_name, arg) {
                Ok(param) => param,
                Err(e) => return FnOutput::Ready(Err(e)),
            };
            let fut = f(param);
            FnOutput::Pending(Box::pin(async move { encode_result(fut.await?) }))
        })
    }

    /// Register a synchronous function with a typed argument and result
    pub fn sync_function<P, R, F>(self, name: impl Into<String>, f: F) -> Self
    where
        P: DeserializeOwned,
        R: Serialize,
        F: Fn(P) -> std::result::Result<R, FnError> + Send + Sync + 'static,
    {
        let name = name.into();
        let fn_name = name.clone();
        self.raw(name, move |arg| {
            let result = decode_arg::<P>(&fn_name, arg)
                .and_then(|param| f(param).map_err(BifrostError::from))
                .and_then(encode_result);
            FnOutput::Ready(result)
        })
    }

    /// Register a function that returns a typed subscription channel
    pub fn channel<P, R, F>(self, name: impl Into<String>, f: F) -> Self
    where
        P: DeserializeOwned,
        R: Serialize + Clone + PartialEq + Send + Sync + 'static,
        F: Fn(P) -> Subscription<R> + Send + Sync + 'static,
    {
        let name = name.into();
        let fn_name = name.clone();
        self.raw(name, move |arg| match decode_arg::<P>(&fn_name, arg) {
            Ok(param) => FnOutput::Channel(f(param).into_json()),
            Err(e) => FnOutput::Ready(Err(e)),
        })
    }

    /// Register a function that returns a `subscribe`-only source
    pub fn subscribable<P, S, F>(self, name: impl Into<String>, f: F) -> Self
    where
        P: DeserializeOwned,
        S: Subscribable + 'static,
        F: Fn(P) -> S + Send + Sync + 'static,
    {
        let name = name.into();
        let fn_name = name.clone();
        self.raw(name, move |arg| match decode_arg::<P>(&fn_name, arg) {
            Ok(param) => FnOutput::Subscribable(Arc::new(f(param))),
            Err(e) => FnOutput::Ready(Err(e)),
        })
    }

    /// Attach an access guard to a registered function under `auth_key`
    pub fn guard<F, Fut>(mut self, name: &str, auth_key: impl Into<String>, check: F) -> Result<Self>
    where
        F: Fn(CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), FnError>> + Send + 'static,
    {
        let i = *self
            .index
            .get(name)
            .ok_or_else(|| BifrostError::UnknownFunction(name.to_string()))?;

        let guard: AccessGuard = Arc::new(move |ctx| Box::pin(check(ctx)));
        self.functions[i].guards.insert(auth_key.into(), guard);
        Ok(self)
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&RegisteredFn> {
        self.index.get(name).map(|&i| &self.functions[i])
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Function names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|f| f.name.as_str())
    }

    /// Functions in registration order
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredFn> {
        self.functions.iter()
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Call a function by name and wait for a plain value
    pub async fn invoke(&self, name: &str, arg: Value) -> Result<Value> {
        let function = self
            .get(name)
            .ok_or_else(|| BifrostError::UnknownFunction(name.to_string()))?;
        settle(name, function.call(arg)).await
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.functions.iter()).finish()
    }
}

/// Wait for a plain value, rejecting subscription outputs
pub async fn settle(fn_name: &str, output: FnOutput) -> Result<Value> {
    match output {
        FnOutput::Ready(result) => result,
        FnOutput::Pending(fut) => fut.await,
        other => Err(BifrostError::ValidationError(format!(
            "{} returned a {} where a plain value was expected",
            fn_name,
            other.kind()
        ))),
    }
}

fn decode_arg<P: DeserializeOwned>(fn_name: &str, arg: Value) -> Result<P> {
    serde_json::from_value(arg).map_err(|e| {
        BifrostError::ValidationError(format!("Invalid argument for {}: {}", fn_name, e))
    })
}

fn encode_result<R: Serialize>(result: R) -> Result<Value> {
    serde_json::to_value(result).map_err(BifrostError::from)
}
