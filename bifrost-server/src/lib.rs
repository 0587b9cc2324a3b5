pub mod api;
pub mod demo;

pub use api::{
    bearer_guard, function_router, ApiServer, ApiServerConfig, FunctionRouteConfig, JwtAuth,
};
pub use demo::acme_registry;
