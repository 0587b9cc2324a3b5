//! Call logging
//!
//! Every access method reports what it is doing to an optional
//! [`CallLogger`]. A logger that panics never affects the call it is
//! observing.

use serde_json::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info};

/// Which surface produced a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    FetchClient,
    FetchServer,
    UseClient,
    UseServer,
    SubscriptionSetup,
    SubscriptionData,
    SubscriptionError,
    ClientSubscriptionData,
    ClientSubscriptionError,
    /// Call received over HTTP
    HttpRequest,
}

impl LogKind {
    /// Stable label for the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::FetchClient => "fetchClient",
            LogKind::FetchServer => "fetchServer",
            LogKind::UseClient => "useClient",
            LogKind::UseServer => "useServer",
            LogKind::SubscriptionSetup => "useClientSubscription-setup",
            LogKind::SubscriptionData => "useClientSubscription-onData",
            LogKind::SubscriptionError => "useClientSubscription-error",
            LogKind::ClientSubscriptionData => "getClientSubscription-onData",
            LogKind::ClientSubscriptionError => "getClientSubscription-error",
            LogKind::HttpRequest => "http-request",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed event
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub fn_name: String,
    pub kind: LogKind,
    /// Argument or delivered value, when there is one
    pub payload: Option<Value>,
    pub error: Option<String>,
}

impl LogRecord {
    pub fn new(fn_name: impl Into<String>, kind: LogKind) -> Self {
        Self {
            fn_name: fn_name.into(),
            kind,
            payload: None,
            error: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Receives call log records
pub trait CallLogger: Send + Sync {
    fn record(&self, record: &LogRecord);
}

impl<F> CallLogger for F
where
    F: Fn(&LogRecord) + Send + Sync,
{
    fn record(&self, record: &LogRecord) {
        self(record)
    }
}

/// Logger that forwards records to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl CallLogger for TracingLogger {
    fn record(&self, record: &LogRecord) {
        match &record.error {
            Some(error) => info!(
                fn_name = %record.fn_name,
                kind = %record.kind,
                error = %error,
                "Call failed"
            ),
            None => info!(
                fn_name = %record.fn_name,
                kind = %record.kind,
                payload = ?record.payload,
                "Call"
            ),
        }
    }
}

/// Hand `record` to `logger`, swallowing any panic it raises
pub fn emit(logger: Option<&Arc<dyn CallLogger>>, record: LogRecord) {
    let Some(logger) = logger else {
        return;
    };

    if catch_unwind(AssertUnwindSafe(|| logger.record(&record))).is_err() {
        debug!(
            "Call logger panicked while recording {} for {}",
            record.kind, record.fn_name
        );
    }
}
