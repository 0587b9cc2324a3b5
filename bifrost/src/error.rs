//! Error types for function invocation
//!
//! Two layers of errors exist:
//! - [`FnError`] is what registered functions, access guards and transports
//!   return. It may carry an HTTP status code.
//! - [`BifrostError`] is what the bridge itself returns. Business failures are
//!   wrapped transparently so callers see them unchanged.

use thiserror::Error;

/// Error produced by a registered function, a guard, or a transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct FnError {
    /// Human readable description
    pub message: String,

    /// Status code to report when the failure crosses an HTTP boundary
    pub status: Option<u16>,
}

impl FnError {
    /// Create an error without a status code
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Create an error that maps to a specific HTTP status code
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

impl From<anyhow::Error> for FnError {
    fn from(e: anyhow::Error) -> Self {
        FnError::new(format!("{:#}", e))
    }
}

impl From<serde_json::Error> for FnError {
    fn from(e: serde_json::Error) -> Self {
        FnError::new(e.to_string())
    }
}

impl From<&str> for FnError {
    fn from(s: &str) -> Self {
        FnError::new(s)
    }
}

impl From<String> for FnError {
    fn from(s: String) -> Self {
        FnError::new(s)
    }
}

/// Main error type for bridge operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BifrostError {
    /// Missing or inconsistent configuration (e.g. no transport for a remote call)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A function broke the contract of the access method it was called through
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The underlying function or transport failed
    #[error(transparent)]
    Function(#[from] FnError),

    /// Cache adapter failure
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Argument or result could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The name is not present in the registry
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
}

impl BifrostError {
    /// Status code carried by a business failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            BifrostError::Function(e) => e.status,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BifrostError {
    fn from(e: serde_json::Error) -> Self {
        BifrostError::SerializationError(e.to_string())
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BifrostError>;
