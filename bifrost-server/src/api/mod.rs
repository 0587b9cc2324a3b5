//! HTTP surface for bifrost functions

pub mod auth;
pub mod routes;
pub mod server;

pub use auth::{allow_any, bearer_guard, deny_with, AuthError, JwtAuth};
pub use routes::{function_router, FunctionRouteConfig};
pub use server::{ApiServer, ApiServerConfig};
