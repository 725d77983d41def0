//! Process diagnostics through `tracing`.
//!
//! Diagnostics go to stderr (or `TELLTALE_LOG_FILE`) so stdout stays clean
//! for command output. `--json-output` switches to one JSON object per line.

use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

const LOG_LEVEL_ENV: &str = "TELLTALE_LOG";
const LOG_FORMAT_ENV: &str = "TELLTALE_LOG_FORMAT";
const LOG_FILE_ENV: &str = "TELLTALE_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable logs.
    #[default]
    Human,
    /// JSON logs (one event per line).
    Json,
    /// Compact logs (single line, terse).
    Compact,
}

impl LogFormat {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" => Some(Self::Human),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Diagnostic verbosity from the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// Parse from CLI argument.
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "verbose" | "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "critical" | "crit" => Some(Self::Error),
            _ => None,
        }
    }

    /// Convert to tracing filter string.
    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Convert from tracing level.
    #[must_use]
    pub const fn from_tracing_level(level: Level) -> Self {
        match level {
            Level::TRACE => Self::Trace,
            Level::DEBUG => Self::Debug,
            Level::INFO => Self::Info,
            Level::WARN => Self::Warn,
            Level::ERROR => Self::Error,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse log level from `TELLTALE_LOG`.
#[must_use]
pub fn parse_log_level(value: Option<String>) -> Option<LogLevel> {
    non_empty(value).and_then(|v| LogLevel::from_arg(&v))
}

/// Parse log format from `TELLTALE_LOG_FORMAT`.
#[must_use]
pub fn parse_log_format(value: Option<String>) -> Option<LogFormat> {
    non_empty(value).and_then(|v| LogFormat::from_arg(&v))
}

/// Log level from the process environment.
#[must_use]
pub fn log_level_from_env() -> Option<LogLevel> {
    parse_log_level(std::env::var(LOG_LEVEL_ENV).ok())
}

/// Log format from the process environment.
#[must_use]
pub fn log_format_from_env() -> Option<LogFormat> {
    parse_log_format(std::env::var(LOG_FORMAT_ENV).ok())
}

/// Log file path from the process environment.
#[must_use]
pub fn log_file_from_env() -> Option<PathBuf> {
    non_empty(std::env::var(LOG_FILE_ENV).ok()).map(PathBuf::from)
}

/// Initialize logging with the given settings.
///
/// `--verbose` raises the default level to debug. `RUST_LOG` overrides both.
pub fn init(level: LogLevel, format: LogFormat, log_file: Option<PathBuf>, verbose: bool) {
    let level = if verbose && matches!(level, LogLevel::Warn | LogLevel::Error) {
        LogLevel::Debug
    } else {
        level
    };

    let file = log_file.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()
    });

    let make_writer = |file: Option<&std::fs::File>| -> BoxMakeWriter {
        if let Some(file) = file.and_then(|inner| inner.try_clone().ok()) {
            BoxMakeWriter::new(file)
        } else {
            BoxMakeWriter::new(std::io::stderr)
        }
    };

    let make_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("telltale={}", level.as_filter())))
    };

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(make_filter())
                .json()
                .with_writer(make_writer(file.as_ref()))
                .with_span_events(FmtSpan::CLOSE)
                .try_init()
                .ok();
        }
        LogFormat::Compact => {
            tracing_subscriber::fmt()
                .with_env_filter(make_filter())
                .compact()
                .with_writer(make_writer(file.as_ref()))
                .with_target(true)
                .try_init()
                .ok();
        }
        LogFormat::Human => {
            tracing_subscriber::fmt()
                .with_env_filter(make_filter())
                .with_writer(make_writer(file.as_ref()))
                .with_target(false)
                .without_time()
                .try_init()
                .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parsing() {
        assert_eq!(parse_log_level(Some("trace".into())), Some(LogLevel::Trace));
        assert_eq!(parse_log_level(Some(" WARN ".into())), Some(LogLevel::Warn));
        assert_eq!(parse_log_level(Some("crit".into())), Some(LogLevel::Error));
        assert_eq!(parse_log_level(Some(String::new())), None);
        assert_eq!(parse_log_level(None), None);
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(parse_log_format(Some("json".into())), Some(LogFormat::Json));
        assert_eq!(parse_log_format(Some("Compact".into())), Some(LogFormat::Compact));
        assert_eq!(parse_log_format(Some("xml".into())), None);
    }

    #[test]
    fn from_tracing_level_round_trips_filters() {
        assert_eq!(LogLevel::from_tracing_level(Level::INFO).as_filter(), "info");
    }
}
