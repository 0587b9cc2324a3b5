//! API server for bifrost functions

use anyhow::Result;
use axum::{routing::get, Router};
use bifrost::{CallLogger, Registry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use super::routes::{function_router, health_check, FunctionRouteConfig};

const DEFAULT_SECRET: &str = "default_secret_change_in_production";

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
    pub auth_key: String,
    pub jwt_secret: String,
}

impl ApiServerConfig {
    /// Read `BIFROST_HOST`, `BIFROST_PORT` and `JWT_SECRET`, falling back to
    /// defaults for anything unset or unparsable
    pub fn from_env() -> Self {
        let port = match std::env::var("BIFROST_PORT") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Ignoring invalid BIFROST_PORT: {}", raw);
                8080
            }),
            Err(_) => 8080,
        };

        Self {
            host: std::env::var("BIFROST_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port,
            api_prefix: "/api-functions".to_string(),
            auth_key: "web".to_string(),
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| DEFAULT_SECRET.to_string()),
        }
    }

    /// Whether the JWT secret is still the built-in placeholder
    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_SECRET
    }
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    registry: Arc<Registry>,
    logger: Option<Arc<dyn CallLogger>>,
}

impl ApiServer {
    /// Create a server exposing `registry`
    pub fn new(config: ApiServerConfig, registry: Arc<Registry>) -> Self {
        Self {
            config,
            registry,
            logger: None,
        }
    }

    /// Report every HTTP call to `logger`
    pub fn with_logger(mut self, logger: Arc<dyn CallLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn config(&self) -> &ApiServerConfig {
        &self.config
    }

    /// Build the full application router
    pub fn router(&self) -> Router {
        let mut route_config =
            FunctionRouteConfig::new(self.config.api_prefix.clone(), self.config.auth_key.clone());
        if let Some(logger) = &self.logger {
            route_config = route_config.with_logger(Arc::clone(logger));
        }

        Router::new()
            // Public routes
            .route("/health", get(health_check))
            .with_state(Arc::clone(&self.registry))
            // Function routes
            .merge(function_router(Arc::clone(&self.registry), route_config))
            .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
    }

    /// Bind to the configured address and serve until the process exits
    pub async fn start(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        if self.config.uses_default_secret() {
            warn!("Using default JWT secret. Set JWT_SECRET or --jwt-secret for production.");
        }

        let app = self.router();
        info!(
            "Starting API server on {} ({} functions, auth key: {})",
            listener.local_addr()?,
            self.registry.len(),
            self.config.auth_key
        );

        axum::serve(listener, app).await?;
        Ok(())
    }
}
