//! Human-readable output using `colored`.
//!
//! Renders usage summaries with a progress bar, provider breakdown and
//! daily bars, and captured entries as one styled line each.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use colored::{ColoredString, Colorize};

use crate::capture::{LogEntry, LogLevel};
use crate::usage::{UsageEvent, UsageStats};
use crate::util::format::{format_percent, format_tokens};

const BAR_WIDTH: usize = 30;
const DAILY_BAR_WIDTH: usize = 24;

/// Apply `style` unless color is disabled.
fn paint(text: &str, no_color: bool, style: impl Fn(&str) -> ColoredString) -> String {
    if no_color {
        text.to_string()
    } else {
        style(text).to_string()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn filled(fraction: f64, width: usize) -> usize {
    ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width)
}

/// Progress bar for `percent` used; color shifts as the allowance runs out.
fn usage_bar(percent: f64, no_color: bool) -> String {
    let full = filled(percent / 100.0, BAR_WIDTH);
    let bar = format!("{}{}", "█".repeat(full), "░".repeat(BAR_WIDTH - full));
    paint(&bar, no_color, |s| {
        if percent >= 90.0 {
            s.red()
        } else if percent >= 75.0 {
            s.yellow()
        } else {
            s.green()
        }
    })
}

/// Render a usage summary.
#[must_use]
pub fn render_usage(stats: &UsageStats, no_color: bool) -> String {
    let mut out = String::new();
    let title = format!("Token usage ({})", stats.window);
    let _ = writeln!(out, "{}", paint(&title, no_color, |s| s.bold()));

    let _ = writeln!(
        out,
        "  {:<10} {:>10}   {:<10} {:>10}   {:<10} {:>10}",
        "Used",
        format_tokens(stats.used),
        "Limit",
        format_tokens(stats.total),
        "Remaining",
        format_tokens(stats.remaining),
    );
    if stats.total > 0 {
        let _ = writeln!(
            out,
            "  {} {}",
            usage_bar(stats.percent_used, no_color),
            format_percent(stats.percent_used)
        );
    } else {
        let _ = writeln!(
            out,
            "  {}",
            paint("No limits configured", no_color, |s| s.dimmed())
        );
    }

    out.push('\n');
    let _ = writeln!(out, "{}", paint("Providers", no_color, |s| s.bold().underline()));
    if stats.provider_breakdown.is_empty() {
        let _ = writeln!(out, "  {}", paint("No usage in this window", no_color, |s| s.dimmed()));
    }
    for share in &stats.provider_breakdown {
        let _ = writeln!(
            out,
            "  {:<16} {:>10}  {:>5}",
            paint(&share.provider, no_color, |s| s.cyan()),
            format_tokens(share.tokens),
            format_percent(share.percentage),
        );
    }

    if !stats.daily_series.is_empty() {
        out.push('\n');
        let _ = writeln!(out, "{}", paint("Daily", no_color, |s| s.bold().underline()));
        let peak = stats.daily_series.totals.iter().copied().max().unwrap_or(0);
        for (label, total) in stats.daily_series.iter() {
            #[allow(clippy::cast_precision_loss)]
            let fraction = if peak == 0 { 0.0 } else { total as f64 / peak as f64 };
            let bar = "▇".repeat(filled(fraction, DAILY_BAR_WIDTH).max(usize::from(total > 0)));
            let _ = writeln!(
                out,
                "  {label}  {:<width$} {}",
                paint(&bar, no_color, |s| s.blue()),
                format_tokens(total),
                width = DAILY_BAR_WIDTH
            );
        }
    }
    out
}

fn level_label(level: LogLevel, no_color: bool) -> String {
    let label = format!("{:<5}", level.as_str().to_uppercase());
    paint(&label, no_color, |s| match level {
        LogLevel::Error => s.red().bold(),
        LogLevel::Warn => s.yellow().bold(),
        LogLevel::Info => s.green(),
        LogLevel::Debug => s.blue(),
    })
}

/// Render one captured entry as a single line.
#[must_use]
pub fn render_entry(entry: &LogEntry, no_color: bool) -> String {
    let timestamp = entry.timestamp().format("%H:%M:%S%.3f").to_string();
    let category = format!("[{}]", entry.category());
    let mut line = format!(
        "{} {} {:<9} {}",
        paint(&timestamp, no_color, |s| s.dimmed()),
        level_label(entry.level(), no_color),
        paint(&category, no_color, |s| s.cyan()),
        entry.message()
    );
    if let Some(trace) = entry.trace() {
        for frame in trace.lines() {
            let _ = write!(line, "\n    {}", paint(frame, no_color, |s| s.dimmed()));
        }
    }
    line
}

/// Render entries, newest first.
#[must_use]
pub fn render_entries(entries: &[Arc<LogEntry>], no_color: bool) -> String {
    if entries.is_empty() {
        return paint("No captured entries.", no_color, |s| s.dimmed());
    }
    entries
        .iter()
        .map(|entry| render_entry(entry, no_color))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render configured limits.
#[must_use]
pub fn render_limits(limits: &BTreeMap<String, u64>, no_color: bool) -> String {
    if limits.is_empty() {
        return paint("No limits configured.", no_color, |s| s.dimmed());
    }
    let mut out = String::new();
    let _ = writeln!(out, "{}", paint("Provider limits", no_color, |s| s.bold()));
    for (provider, limit) in limits {
        let _ = writeln!(
            out,
            "  {:<16} {:>10}",
            paint(provider, no_color, |s| s.cyan()),
            format_tokens(*limit)
        );
    }
    out
}

/// Render a recorded event confirmation.
#[must_use]
pub fn render_event(event: &UsageEvent, no_color: bool) -> String {
    format!(
        "{} {} / {}: {} prompt + {} completion = {} tokens",
        paint("Recorded", no_color, |s| s.green().bold()),
        event.provider(),
        event.model(),
        event.prompt_tokens(),
        event.completion_tokens(),
        event.total_tokens()
    )
}

/// Render the capture flag state.
#[must_use]
pub fn render_debug_status(enabled: bool, no_color: bool) -> String {
    let state = if enabled {
        paint("enabled", no_color, |s| s.green().bold())
    } else {
        paint("disabled", no_color, |s| s.dimmed())
    };
    format!("Debug capture: {state}")
}
