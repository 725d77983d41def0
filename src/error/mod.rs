//! Error types for telltale.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are grouped into five categories:
//! - **Storage**: durable key-value store reads and writes
//! - **Network**: transport failures surfaced by CLI commands
//! - **Configuration**: config file parsing, validation, bad arguments
//! - **Capture**: misuse of the capture pipeline
//! - **Internal**: I/O, JSON and unclassified failures
//!
//! Each error has a stable error code (e.g., `TT-S001`) for programmatic handling.
//!
//! Library operations that the data model declares non-fatal (loading the
//! usage ledger, reading the capture flag) never return these errors; they
//! log and fall back instead.

pub mod suggestions;

use thiserror::Error;

pub use suggestions::FixSuggestion;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Durable storage issues (unreadable, corrupt, unwritable).
    Storage,
    /// Network issues surfaced by the HTTP transport.
    Network,
    /// Configuration and argument issues.
    Configuration,
    /// Capture pipeline misuse.
    Capture,
    /// Internal errors (bugs, unexpected state, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Storage => "Storage error",
            Self::Network => "Network error",
            Self::Configuration => "Configuration error",
            Self::Capture => "Capture error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Storage => "S",
            Self::Network => "N",
            Self::Configuration => "C",
            Self::Capture => "D",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Invalid arguments or configuration
    ConfigError = 2,
    /// Durable storage could not be used
    StorageError = 3,
    /// Network request failed or timed out
    NetworkError = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for telltale operations.
#[derive(Error, Debug)]
pub enum TelltaleError {
    // ==========================================================================
    // Storage errors (Category: Storage)
    // ==========================================================================
    /// The durable store could not be read.
    #[error("failed to read storage key '{key}': {message}")]
    StorageRead { key: String, message: String },

    /// The durable store could not be written.
    #[error("failed to write storage key '{key}': {message}")]
    StorageWrite { key: String, message: String },

    /// A persisted document exists but does not parse.
    #[error("corrupt persisted document '{key}': {message}")]
    StorageCorrupt { key: String, message: String },

    // ==========================================================================
    // Network errors (Category: Network)
    // ==========================================================================
    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid { key: String, message: String },

    /// Generic configuration or argument error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unknown usage window label.
    #[error("unknown usage window '{0}' (expected 24h, 7d, 30d or all)")]
    InvalidWindow(String),

    // ==========================================================================
    // Capture errors (Category: Capture)
    // ==========================================================================
    /// Operation requires capture to be enabled.
    #[error("debug capture is disabled")]
    CaptureDisabled,

    /// The prune timer thread could not be started.
    #[error("failed to start capture timer: {0}")]
    TimerSpawn(String),

    // ==========================================================================
    // Internal errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TelltaleError {
    /// Map error to a process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self.category() {
            ErrorCategory::Configuration => ExitCode::ConfigError,
            ErrorCategory::Storage => ExitCode::StorageError,
            ErrorCategory::Network => ExitCode::NetworkError,
            ErrorCategory::Capture | ErrorCategory::Internal => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::StorageRead { .. } | Self::StorageWrite { .. } | Self::StorageCorrupt { .. } => {
                ErrorCategory::Storage
            }

            Self::Network(_) | Self::Timeout(_) => ErrorCategory::Network,

            Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::Config(_)
            | Self::InvalidWindow(_) => ErrorCategory::Configuration,

            Self::CaptureDisabled | Self::TimerSpawn(_) => ErrorCategory::Capture,

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `TT-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::StorageRead { .. } => "TT-S001",
            Self::StorageWrite { .. } => "TT-S002",
            Self::StorageCorrupt { .. } => "TT-S003",

            Self::Network(_) => "TT-N001",
            Self::Timeout(_) => "TT-N002",

            Self::ConfigParse { .. } => "TT-C001",
            Self::ConfigInvalid { .. } => "TT-C002",
            Self::Config(_) => "TT-C003",
            Self::InvalidWindow(_) => "TT-C004",

            Self::CaptureDisabled => "TT-D001",
            Self::TimerSpawn(_) => "TT-D002",

            Self::Io(_) => "TT-X001",
            Self::Json(_) => "TT-X002",
            Self::Other(_) => "TT-X099",
        }
    }

    /// Returns whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::StorageWrite { .. }
        )
    }

    /// Returns actionable fix suggestions for this error.
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::StorageRead { key, .. } | Self::StorageCorrupt { key, .. } => {
                suggestions::storage_corrupt_suggestions(key)
            }
            Self::StorageWrite { key, message } => {
                suggestions::storage_write_suggestions(key, message)
            }
            Self::Network(message) => suggestions::network_suggestions(message),
            Self::Timeout(seconds) => suggestions::timeout_suggestions(*seconds),
            Self::ConfigParse { path, message } => {
                suggestions::config_parse_suggestions(path, message)
            }
            Self::ConfigInvalid { key, message } => {
                suggestions::config_invalid_suggestions(key, message)
            }
            Self::Config(message) => vec![FixSuggestion::new(
                vec!["telltale --help".to_string()],
                format!("Configuration error: {message}"),
            )],
            Self::InvalidWindow(_) => vec![FixSuggestion::new(
                vec![
                    "telltale usage --window 24h".to_string(),
                    "telltale usage --window all".to_string(),
                ],
                "Usage windows are 24h, 7d, 30d or all.",
            )],
            Self::CaptureDisabled => vec![FixSuggestion::new(
                vec!["telltale debug enable".to_string()],
                "Debug capture is off, so nothing is being recorded.",
            )],
            Self::TimerSpawn(_) | Self::Io(_) | Self::Json(_) | Self::Other(_) => Vec::new(),
        }
    }
}

/// Result type alias for telltale operations.
pub type Result<T> = std::result::Result<T, TelltaleError>;
