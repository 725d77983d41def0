//! The global error-reporting primitive.
//!
//! Two channels mirror what a host runtime surfaces: uncaught synchronous
//! errors (with source location) and unhandled asynchronous failures.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::PanicHookInfo;

use serde::Serialize;
use serde_json::Value;

/// An uncaught error with its source location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(skip)]
    pub trace: Option<String>,
}

impl ErrorReport {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn at(mut self, source: impl Into<String>, line: u32, column: u32) -> Self {
        self.source = Some(source.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Build a report from a panic, capturing a backtrace when enabled.
    #[must_use]
    pub fn from_panic(info: &PanicHookInfo<'_>) -> Self {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with non-string payload".to_string());

        let mut report = Self::new(message);
        if let Some(location) = info.location() {
            report = report.at(location.file(), location.line(), location.column());
        }
        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            report.trace = Some(backtrace.to_string());
        }
        report
    }
}

/// Receives uncaught errors and unhandled failures.
///
/// Both methods return whether the error was handled; `true` suppresses the
/// default reporting.
pub trait ErrorHandler: Send + Sync {
    fn on_error(&self, report: &ErrorReport) -> bool;

    fn on_unhandled_rejection(&self, reason: &Value) -> bool;
}

/// Default handler: logs through `tracing` and never claims the error.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn on_error(&self, report: &ErrorReport) -> bool {
        tracing::error!(
            source = report.source.as_deref(),
            line = report.line,
            column = report.column,
            "uncaught error: {}",
            report.message
        );
        false
    }

    fn on_unhandled_rejection(&self, reason: &Value) -> bool {
        tracing::error!(reason = %reason, "unhandled rejection");
        false
    }
}

/// Render a rejection reason as display text.
#[must_use]
pub fn reason_text(reason: &Value) -> String {
    match reason {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| reason.to_string(), str::to_string),
        other => other.to_string(),
    }
}
