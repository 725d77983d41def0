//! Robot-mode output (JSON and Markdown).
//!
//! Provides stable, token-efficient output for scripts and agents.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::LogEntry;
use crate::error::Result;
use crate::usage::{UsageEvent, UsageStats};

/// Schema identifier carried by every JSON document.
pub const SCHEMA_VERSION: &str = "telltale.v1";

/// Top-level JSON envelope for robot mode output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotOutput<T> {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub command: String,
    pub data: T,

    #[serde(default)]
    pub errors: Vec<String>,
}

impl<T> RobotOutput<T> {
    /// Create a new robot output envelope.
    pub fn new(command: impl Into<String>, data: T) -> Self {
        Self::with_errors(command, data, Vec::new())
    }

    /// Create with errors.
    pub fn with_errors(command: impl Into<String>, data: T, errors: Vec<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            command: command.into(),
            data,
            errors,
        }
    }
}

/// Render any serializable value as JSON.
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn render_json<T: Serialize>(output: &T, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(output)?)
    } else {
        Ok(serde_json::to_string(output)?)
    }
}

/// Render usage stats inside the envelope.
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn render_usage_json(stats: &UsageStats, pretty: bool) -> Result<String> {
    render_json(&RobotOutput::new("usage", stats), pretty)
}

/// Render usage stats as Markdown.
#[must_use]
pub fn render_usage_md(stats: &UsageStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Usage ({})\n", stats.window);
    let _ = writeln!(out, "- total: {}", stats.total);
    let _ = writeln!(out, "- used: {}", stats.used);
    let _ = writeln!(out, "- remaining: {}", stats.remaining);
    let _ = writeln!(out, "- percent_used: {:.1}", stats.percent_used);

    if !stats.provider_breakdown.is_empty() {
        out.push_str("\n### Providers\n\n| provider | tokens | share |\n|---|---:|---:|\n");
        for share in &stats.provider_breakdown {
            let _ = writeln!(
                out,
                "| {} | {} | {:.1}% |",
                share.provider, share.tokens, share.percentage
            );
        }
    }

    if !stats.daily_series.is_empty() {
        out.push_str("\n### Daily\n\n| day | tokens |\n|---|---:|\n");
        for (label, total) in stats.daily_series.iter() {
            let _ = writeln!(out, "| {label} | {total} |");
        }
    }
    out
}

/// Render captured entries as Markdown, one bullet per entry.
#[must_use]
pub fn render_entries_md(entries: &[Arc<LogEntry>]) -> String {
    if entries.is_empty() {
        return "_no captured entries_\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "- `{}` **{}/{}** {}",
            entry.timestamp().format("%H:%M:%S%.3f"),
            entry.level(),
            entry.category(),
            entry.message()
        );
    }
    out
}

/// Render configured limits as Markdown.
#[must_use]
pub fn render_limits_md(limits: &BTreeMap<String, u64>) -> String {
    if limits.is_empty() {
        return "_no limits configured_\n".to_string();
    }
    let mut out = String::from("| provider | limit |\n|---|---:|\n");
    for (provider, limit) in limits {
        let _ = writeln!(out, "| {provider} | {limit} |");
    }
    out
}

/// Render a recorded event as Markdown.
#[must_use]
pub fn render_event_md(event: &UsageEvent) -> String {
    format!(
        "- recorded: {} / {} prompt={} completion={} total={}\n",
        event.provider(),
        event.model(),
        event.prompt_tokens(),
        event.completion_tokens(),
        event.total_tokens()
    )
}
