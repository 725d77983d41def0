//! The console primitive: four logging severities.

use serde_json::Value;

use crate::capture::LogLevel;

/// A sink for console output.
pub trait Console: Send + Sync {
    /// Write one console line at `level`, with optional structured arguments.
    fn write(&self, level: LogLevel, message: &str, data: Option<&Value>);
}

impl dyn Console {
    pub fn debug(&self, message: &str) {
        self.write(LogLevel::Debug, message, None);
    }

    pub fn info(&self, message: &str) {
        self.write(LogLevel::Info, message, None);
    }

    pub fn warn(&self, message: &str) {
        self.write(LogLevel::Warn, message, None);
    }

    pub fn error(&self, message: &str) {
        self.write(LogLevel::Error, message, None);
    }
}

/// Console that forwards to `tracing` under the `telltale::console` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsole;

impl Console for TracingConsole {
    fn write(&self, level: LogLevel, message: &str, data: Option<&Value>) {
        let data = data.map(Value::to_string);
        match level {
            LogLevel::Debug => {
                tracing::debug!(target: "telltale::console", data = data.as_deref(), "{message}");
            }
            LogLevel::Info => {
                tracing::info!(target: "telltale::console", data = data.as_deref(), "{message}");
            }
            LogLevel::Warn => {
                tracing::warn!(target: "telltale::console", data = data.as_deref(), "{message}");
            }
            LogLevel::Error => {
                tracing::error!(target: "telltale::console", data = data.as_deref(), "{message}");
            }
        }
    }
}
