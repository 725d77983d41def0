//! Output rendering for human and robot modes.

pub mod error;
pub mod human;
pub mod robot;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::capture::LogEntry;
use crate::cli::args::OutputFormat;
use crate::error::Result;
use crate::usage::{UsageEvent, UsageStats};
pub use robot::{RobotOutput, SCHEMA_VERSION};

/// Render usage stats.
pub fn render_usage(
    stats: &UsageStats,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_usage(stats, no_color)),
        OutputFormat::Json => robot::render_usage_json(stats, pretty),
        OutputFormat::Md => Ok(robot::render_usage_md(stats)),
    }
}

/// Render captured entries under `command`.
pub fn render_entries(
    command: &str,
    entries: &[Arc<LogEntry>],
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_entries(entries, no_color)),
        OutputFormat::Json => robot::render_json(&RobotOutput::new(command, entries), pretty),
        OutputFormat::Md => Ok(robot::render_entries_md(entries)),
    }
}

/// Render provider limits.
pub fn render_limits(
    limits: &BTreeMap<String, u64>,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_limits(limits, no_color)),
        OutputFormat::Json => robot::render_json(&RobotOutput::new("limits", limits), pretty),
        OutputFormat::Md => Ok(robot::render_limits_md(limits)),
    }
}

/// Render a freshly recorded usage event.
pub fn render_event(
    command: &str,
    event: &UsageEvent,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_event(event, no_color)),
        OutputFormat::Json => robot::render_json(&RobotOutput::new(command, event), pretty),
        OutputFormat::Md => Ok(robot::render_event_md(event)),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugStatus {
    enabled: bool,
}

/// Render the persisted capture flag.
pub fn render_debug_status(
    command: &str,
    enabled: bool,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_debug_status(enabled, no_color)),
        OutputFormat::Json => {
            robot::render_json(&RobotOutput::new(command, DebugStatus { enabled }), pretty)
        }
        OutputFormat::Md => Ok(format!("- debug_mode: {enabled}\n")),
    }
}
