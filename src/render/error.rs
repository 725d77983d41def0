//! Error rendering for telltale.
//!
//! Provides styled error rendering with fix suggestions for terminal output,
//! as well as simple text output for non-TTY environments.

use colored::Colorize;
use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::error::{FixSuggestion, TelltaleError};

// =============================================================================
// Public API
// =============================================================================

/// Render an error with appropriate formatting based on terminal capabilities.
#[must_use]
pub fn render_error(error: &TelltaleError, format: OutputFormat, no_color: bool) -> String {
    render_error_full(error, format, no_color, false)
}

/// Render an error with full control over all formatting options.
///
/// JSON and Markdown formats produce structured JSON. Human format is styled
/// only when color is allowed and stderr is a terminal.
#[must_use]
pub fn render_error_full(
    error: &TelltaleError,
    format: OutputFormat,
    no_color: bool,
    pretty: bool,
) -> String {
    match format {
        OutputFormat::Json => return render_error_json(error, pretty),
        OutputFormat::Md => return render_error_json(error, true),
        OutputFormat::Human => {}
    }

    let styled = !no_color
        && crate::util::env::should_use_color(no_color)
        && crate::util::env::stderr_is_tty();
    if styled {
        render_styled(error)
    } else {
        render_simple(error)
    }
}

/// Render error as structured JSON for machine consumption.
#[must_use]
pub fn render_error_json(error: &TelltaleError, pretty: bool) -> String {
    let error_json = ErrorJson::from_error(error);
    let rendered = if pretty {
        serde_json::to_string_pretty(&error_json)
    } else {
        serde_json::to_string(&error_json)
    };
    rendered.unwrap_or_else(|_| render_simple(error))
}

// =============================================================================
// Styled Terminal Rendering
// =============================================================================

fn render_styled(error: &TelltaleError) -> String {
    let suggestions = error.fix_suggestions();
    let mut lines = vec![
        format!(
            "{} {}",
            format!("{}:", error.category()).red().bold(),
            error.to_string().red()
        ),
        format!("  {}", format!("[{}]", error.error_code()).dimmed()),
    ];

    if !suggestions.is_empty() {
        lines.push(String::new());
        lines.push(render_suggestions_section(&suggestions));
    }

    if let Some(first) = suggestions.first() {
        if !first.context.is_empty() {
            lines.push(String::new());
            lines.push("Why this happened:".yellow().to_string());
            lines.extend(wrap_text(&first.context, 60).into_iter().map(|l| format!("  {l}")));
        }
        if let Some(prevention) = &first.prevention {
            lines.push(String::new());
            lines.push("Prevention:".green().to_string());
            lines.extend(wrap_text(prevention, 60).into_iter().map(|l| format!("  {l}")));
        }
    }

    lines.join("\n")
}

fn render_suggestions_section(suggestions: &[FixSuggestion]) -> String {
    let mut lines = vec!["How to fix:".bold().to_string()];
    for (i, suggestion) in suggestions.iter().enumerate() {
        for (j, cmd) in suggestion.commands.iter().enumerate() {
            let prefix = if j == 0 {
                format!("  {}. ", i + 1)
            } else {
                "     Or: ".to_string()
            };
            lines.push(format!("{prefix}{}", cmd.cyan()));
        }
    }
    lines.join("\n")
}

// =============================================================================
// Simple Text Rendering
// =============================================================================

/// Render error as simple text (no ANSI codes).
fn render_simple(error: &TelltaleError) -> String {
    let mut lines = vec![format!("Error [{}]: {}", error.error_code(), error)];

    let fix = error
        .fix_suggestions()
        .into_iter()
        .flat_map(|s| s.commands)
        .find(|cmd| !cmd.starts_with('#'));
    if let Some(cmd) = fix {
        lines.push(format!("Fix: {cmd}"));
    }

    lines.join("\n")
}

// =============================================================================
// JSON Rendering
// =============================================================================

/// JSON representation of an error for machine consumption.
#[derive(Serialize)]
struct ErrorJson {
    error_code: String,
    category: String,
    message: String,
    is_retryable: bool,
    exit_code: i32,
    suggestions: Vec<SuggestionJson>,
}

#[derive(Serialize)]
struct SuggestionJson {
    commands: Vec<String>,
    context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prevention: Option<String>,
}

impl ErrorJson {
    fn from_error(error: &TelltaleError) -> Self {
        Self {
            error_code: error.error_code().to_string(),
            category: error.category().to_string(),
            message: error.to_string(),
            is_retryable: error.is_retryable(),
            exit_code: error.exit_code().into(),
            suggestions: error
                .fix_suggestions()
                .into_iter()
                .map(|s| SuggestionJson {
                    commands: s.commands,
                    context: s.context,
                    prevention: s.prevention,
                })
                .collect(),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
