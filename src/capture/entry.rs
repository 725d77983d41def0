//! Captured log entries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum message length in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Maximum number of trace lines kept.
pub const MAX_TRACE_LINES: usize = 5;

/// Severity of a captured entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown level '{other}' (expected debug, info, warn, error)")),
        }
    }
}

/// What part of the application an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Network,
    State,
    User,
    System,
    Error,
}

impl LogCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::State => "state",
            Self::User => "user",
            Self::System => "system",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "network" => Ok(Self::Network),
            "state" => Ok(Self::State),
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            "error" => Ok(Self::Error),
            other => Err(format!(
                "unknown category '{other}' (expected network, state, user, system, error)"
            )),
        }
    }
}

/// One captured observation. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    category: LogCategory,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
}

impl LogEntry {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(level: LogLevel, category: LogCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().trunc_subsecs(3),
            level,
            category,
            message: cap_message(message.into()),
            data: None,
            trace: None,
        }
    }

    /// Attach already-bounded structured data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a trace, keeping the first few lines.
    #[must_use]
    pub fn with_trace(mut self, trace: &str) -> Self {
        let lines: Vec<&str> = trace.lines().take(MAX_TRACE_LINES).collect();
        if !lines.is_empty() {
            self.trace = Some(lines.join("\n"));
        }
        self
    }

    /// Override the timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(3);
        self
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }

    #[must_use]
    pub const fn category(&self) -> LogCategory {
        self.category
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    #[must_use]
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }
}

fn cap_message(message: String) -> String {
    match message.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_is_capped_in_characters() {
        let long = "é".repeat(1500);
        let entry = LogEntry::new(LogLevel::Info, LogCategory::System, long);
        assert_eq!(entry.message().chars().count(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn trace_keeps_five_lines() {
        let trace = (1..=9).map(|i| format!("frame {i}")).collect::<Vec<_>>().join("\n");
        let entry = LogEntry::new(LogLevel::Error, LogCategory::Error, "x").with_trace(&trace);
        assert_eq!(entry.trace().map(|t| t.lines().count()), Some(5));
        assert!(entry.trace().is_some_and(|t| t.ends_with("frame 5")));
    }

    #[test]
    fn timestamp_has_millisecond_precision() {
        let entry = LogEntry::new(LogLevel::Debug, LogCategory::State, "x");
        assert_eq!(entry.timestamp().timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn serializes_lowercase_enums() {
        let entry = LogEntry::new(LogLevel::Warn, LogCategory::Network, "m").with_data(json!({"a": 1}));
        let value = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(value["level"], "warn");
        assert_eq!(value["category"], "network");
        assert_eq!(value["data"]["a"], 1);
        assert!(value.get("trace").is_none());
    }

    #[test]
    fn parses_levels_and_categories() {
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("user".parse::<LogCategory>(), Ok(LogCategory::User));
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
