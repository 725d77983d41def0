//! Fix suggestion database for telltale errors.
//!
//! Provides actionable fix suggestions mapped to specific error types,
//! including commands, context explanations, and prevention tips.

// =============================================================================
// Fix Suggestion Types
// =============================================================================

/// A fix suggestion for an error.
#[derive(Debug, Clone)]
pub struct FixSuggestion {
    /// Primary fix commands in order of preference.
    /// These should be copy-paste ready for the terminal.
    pub commands: Vec<String>,

    /// Explanation of why this error occurred.
    pub context: String,

    /// Tips to prevent this error in the future.
    pub prevention: Option<String>,
}

impl FixSuggestion {
    /// Creates a new fix suggestion with required fields.
    #[must_use]
    pub fn new(commands: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            commands,
            context: context.into(),
            prevention: None,
        }
    }

    /// Builder: adds prevention tips.
    #[must_use]
    pub fn with_prevention(mut self, prevention: impl Into<String>) -> Self {
        self.prevention = Some(prevention.into());
        self
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Generates fix suggestions for unreadable or corrupt persisted documents.
#[must_use]
pub fn storage_corrupt_suggestions(key: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec!["telltale usage --format json".to_string()],
            format!(
                "The persisted value for '{key}' could not be read. telltale falls back \
                 to an empty state and overwrites it on the next write."
            ),
        )
        .with_prevention("Avoid editing storage.json by hand while telltale is running."),
    ]
}

/// Generates fix suggestions for failed storage writes.
#[must_use]
pub fn storage_write_suggestions(key: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["df -h".to_string(), "ls -ld \"$XDG_DATA_HOME\"".to_string()],
        format!("Writing '{key}' failed: {message}. Check free space and directory permissions."),
    )]
}

// =============================================================================
// Network Errors
// =============================================================================

/// Generates fix suggestions for transport failures.
#[must_use]
pub fn network_suggestions(message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["curl -I <url>".to_string()],
        format!("Network error: {message}. Check your internet connection."),
    )]
}

/// Generates fix suggestions for timeout errors.
#[must_use]
pub fn timeout_suggestions(seconds: u64) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![format!("telltale debug trace <url> --timeout {}", seconds * 2)],
            format!("The request did not complete within {seconds}s."),
        )
        .with_prevention("Increase the timeout with `--timeout`."),
    ]
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Generates fix suggestions for config parse errors.
#[must_use]
pub fn config_parse_suggestions(path: &str, message: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![format!("$EDITOR {path}")],
            format!("The config file has a syntax error. The TOML parser reported: {message}"),
        )
        .with_prevention("Use a TOML-aware editor with syntax highlighting."),
    ]
}

/// Generates fix suggestions for invalid config value errors.
#[must_use]
pub fn config_invalid_suggestions(key: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("$EDITOR <config.toml>  # fix '{key}'")],
        format!("Invalid config value for '{key}'. {message}"),
    )]
}
