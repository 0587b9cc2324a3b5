//! HTTP routes for registered functions
//!
//! Every function in a registry gets a `POST {api_prefix}/{name}` endpoint.
//! An endpoint only serves calls when the function carries a guard under the
//! router's auth key, so nothing is exposed by accident.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bifrost::logger::{self, CallLogger, LogKind, LogRecord};
use bifrost::registry::{self, CallContext, FnOutput, Registry};
use bifrost::{BifrostError, FnError};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Body returned when a result cannot be sent as JSON
pub const NOT_WIRE_SAFE: &str =
    "Error: Return data cannot be passed over the wire. Must be a plain JSON value.";

/// Settings for [`function_router`]
#[derive(Clone)]
pub struct FunctionRouteConfig {
    /// Path prefix; leading, trailing and doubled slashes are ignored
    pub api_prefix: String,

    /// Guard key a function must be registered under to be served
    pub auth_key: String,

    pub logger: Option<Arc<dyn CallLogger>>,
}

impl FunctionRouteConfig {
    pub fn new(api_prefix: impl Into<String>, auth_key: impl Into<String>) -> Self {
        Self {
            api_prefix: api_prefix.into(),
            auth_key: auth_key.into(),
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn CallLogger>) -> Self {
        self.logger = Some(logger);
        self
    }
}

impl Default for FunctionRouteConfig {
    fn default() -> Self {
        Self::new("/api-functions", "web")
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub functions: usize,
}

/// Health check endpoint
pub async fn health_check(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        functions: registry.len(),
    })
}

/// Per-endpoint state
struct FunctionRoute {
    name: String,
    registry: Arc<Registry>,
    auth_key: String,
    logger: Option<Arc<dyn CallLogger>>,
}

/// Strip empty segments from a prefix: `"/api//fns/"` becomes `"api/fns"`
pub fn normalize_prefix(prefix: &str) -> String {
    prefix
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Endpoint path for `fn_name` under `prefix`
pub fn route_path(prefix: &str, fn_name: &str) -> String {
    match normalize_prefix(prefix).as_str() {
        "" => format!("/{}", fn_name),
        prefix => format!("/{}/{}", prefix, fn_name),
    }
}

/// Build a router exposing every function in `registry`
pub fn function_router(registry: Arc<Registry>, config: FunctionRouteConfig) -> Router {
    let mut router = Router::new();

    for function in registry.iter() {
        let path = route_path(&config.api_prefix, function.name());
        if function.guard(&config.auth_key).is_some() {
            info!("Registering api path: {}", path);
        } else {
            debug!(
                "{} has no guard under auth key {}; endpoint will refuse calls",
                function.name(),
                config.auth_key
            );
        }

        let route = Arc::new(FunctionRoute {
            name: function.name().to_string(),
            registry: Arc::clone(&registry),
            auth_key: config.auth_key.clone(),
            logger: config.logger.clone(),
        });
        router = router.route(&path, post(call_function).with_state(route));
    }

    router
}

async fn call_function(
    State(route): State<Arc<FunctionRoute>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let parsed = parse_body(&body);
    let record = match &parsed {
        Ok(arg) => LogRecord::new(route.name.clone(), LogKind::HttpRequest).with_payload(arg.clone()),
        Err(e) => LogRecord::new(route.name.clone(), LogKind::HttpRequest)
            .with_payload(Value::String(String::from_utf8_lossy(&body).into_owned()))
            .with_error(e),
    };
    logger::emit(route.logger.as_ref(), record);

    let arg = match parsed {
        Ok(arg) => arg,
        Err(e) => {
            debug!("Rejecting malformed body for {}: {}", route.name, e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "Error: request body must be JSON" })),
            )
                .into_response();
        }
    };

    let Some(function) = route.registry.get(&route.name) else {
        return error_response(&route.name, BifrostError::UnknownFunction(route.name.clone()));
    };

    let guard = match function.guard(&route.auth_key) {
        Some(guard) => guard,
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "status": "unauthorized",
                    "details": format!("No auth defined for this function. AuthKey: {}", route.auth_key),
                })),
            )
                .into_response();
        }
    };

    if let Err(e) = guard(context_from(&headers)).await {
        return error_response(&route.name, BifrostError::Function(e));
    }

    let output = function.call(arg);
    if !output.is_plain() {
        error!("{} returned a {} over HTTP", route.name, output.kind());
        if let FnOutput::Channel(channel) = output {
            channel.dispose();
        }
        return not_wire_safe();
    }

    match registry::settle(&route.name, output).await {
        Ok(value) => Json(value).into_response(),
        Err(e) => error_response(&route.name, e),
    }
}

fn parse_body(body: &[u8]) -> serde_json::Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
}

fn context_from(headers: &HeaderMap) -> CallContext {
    let mut ctx = CallContext::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            ctx.insert_header(name.as_str(), value);
        }
    }
    ctx
}

fn not_wire_safe() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "status": NOT_WIRE_SAFE })),
    )
        .into_response()
}

fn error_response(fn_name: &str, err: BifrostError) -> Response {
    match err {
        BifrostError::SerializationError(e) => {
            error!("{} returned a value that cannot be serialized: {}", fn_name, e);
            not_wire_safe()
        }
        BifrostError::Function(FnError {
            status: Some(status),
            ..
        }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(json!({ "status": "Error" }))).into_response()
        }
        other => {
            error!("{} failed: {}", fn_name, other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Error" })),
            )
                .into_response()
        }
    }
}
