//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::capture::{LogCategory, LogFilter, LogLevel};
use crate::usage::UsageWindow;

/// telltale - debug-event capture and LLM token usage accounting.
#[derive(Parser, Debug)]
#[command(name = "telltale")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub const fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show aggregated token usage (default command)
    Usage(UsageArgs),

    /// Record one usage event
    Record(RecordArgs),

    /// Count tokens in a chat transcript and record them
    Count(CountArgs),

    /// Manage per-provider token limits
    #[command(subcommand)]
    Limits(LimitsCommand),

    /// Control and inspect debug capture
    #[command(subcommand)]
    Debug(DebugCommand),
}

/// Arguments for the `usage` command.
#[derive(Args, Debug, Default)]
pub struct UsageArgs {
    /// Time window to aggregate over
    #[arg(long, short = 'w', value_enum, default_value = "24h")]
    pub window: UsageWindow,
}

/// Arguments for the `record` command.
#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Provider name (e.g. openai, anthropic)
    #[arg(long)]
    pub provider: String,

    /// Model name
    #[arg(long)]
    pub model: String,

    /// Prompt tokens
    #[arg(long, value_name = "TOKENS")]
    pub prompt: u64,

    /// Completion tokens
    #[arg(long, value_name = "TOKENS")]
    pub completion: u64,
}

/// Arguments for the `count` command.
#[derive(Args, Debug)]
pub struct CountArgs {
    /// Provider name
    #[arg(long)]
    pub provider: String,

    /// Model name
    #[arg(long)]
    pub model: String,

    /// JSON file holding `[{"role": ..., "content": ...}]`
    #[arg(value_name = "TRANSCRIPT")]
    pub transcript: PathBuf,

    /// Count without recording
    #[arg(long)]
    pub dry_run: bool,
}

/// Limit subcommands.
#[derive(Subcommand, Debug)]
pub enum LimitsCommand {
    /// List configured limits
    List,

    /// Set a provider's token limit
    Set {
        /// Provider name
        provider: String,
        /// Token allowance
        tokens: u64,
    },

    /// Remove a provider's token limit
    Remove {
        /// Provider name
        provider: String,
    },
}

/// Debug capture subcommands.
#[derive(Subcommand, Debug)]
pub enum DebugCommand {
    /// Show whether capture is persisted as enabled
    Status,

    /// Enable capture and persist the flag
    Enable,

    /// Disable capture and persist the flag
    Disable,

    /// Capture a single HTTP request and print the entries it produced
    Trace(TraceArgs),
}

/// Arguments for `debug trace`.
#[derive(Args, Debug)]
pub struct TraceArgs {
    /// URL to request
    pub url: String,

    /// HTTP method
    #[arg(long, short = 'X', default_value = "GET")]
    pub method: String,

    /// Extra request header as `name: value` (repeatable)
    #[arg(long = "header", short = 'H', value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Request body
    #[arg(long, short = 'd')]
    pub body: Option<String>,

    /// Only show entries at this level
    #[arg(long, value_parser = parse_level)]
    pub level: Option<LogLevel>,

    /// Only show entries in this category
    #[arg(long, value_parser = parse_category)]
    pub category: Option<LogCategory>,

    /// Only show entries whose message or data contains this text
    #[arg(long)]
    pub search: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

impl TraceArgs {
    /// Entry filter built from the flags.
    #[must_use]
    pub fn filter(&self) -> LogFilter {
        let mut filter = LogFilter::new();
        if let Some(level) = self.level {
            filter = filter.level(level);
        }
        if let Some(category) = self.category {
            filter = filter.category(category);
        }
        if let Some(search) = &self.search {
            filter = filter.search(search.clone());
        }
        filter
    }

    /// Parsed `name: value` header pairs.
    ///
    /// # Errors
    ///
    /// Returns an error for a header without a colon.
    pub fn header_pairs(&self) -> crate::error::Result<Vec<(String, String)>> {
        self.headers
            .iter()
            .map(|raw| {
                raw.split_once(':')
                    .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                    .filter(|(name, _)| !name.is_empty())
                    .ok_or_else(|| {
                        crate::error::TelltaleError::Config(format!(
                            "Invalid header '{raw}'. Expected 'name: value'"
                        ))
                    })
            })
            .collect()
    }
}

fn parse_level(s: &str) -> Result<LogLevel, String> {
    s.parse()
}

fn parse_category(s: &str) -> Result<LogCategory, String> {
    s.parse()
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable terminal output
    #[default]
    Human,
    /// JSON for scripts and agents
    Json,
    /// Markdown
    Md,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_overrides_format() {
        let cli = Cli::parse_from(["telltale", "--format", "md", "--json"]);
        assert_eq!(cli.effective_format(), OutputFormat::Json);
    }

    #[test]
    fn usage_window_parses() {
        let cli = Cli::parse_from(["telltale", "usage", "--window", "7d"]);
        match cli.command {
            Some(Commands::Usage(args)) => assert_eq!(args.window, UsageWindow::Week),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn trace_builds_filter_and_headers() {
        let cli = Cli::parse_from([
            "telltale",
            "debug",
            "trace",
            "http://localhost/x",
            "--category",
            "network",
            "--level",
            "warning",
            "-H",
            "x-id: 7",
        ]);
        let Some(Commands::Debug(DebugCommand::Trace(args))) = cli.command else {
            panic!("expected trace");
        };
        let filter = args.filter();
        assert_eq!(filter.category, Some(LogCategory::Network));
        assert_eq!(filter.level, Some(LogLevel::Warn));
        assert_eq!(
            args.header_pairs().expect("headers"),
            vec![("x-id".to_string(), "7".to_string())]
        );
    }

    #[test]
    fn malformed_header_is_rejected() {
        let cli = Cli::parse_from(["telltale", "debug", "trace", "http://x", "-H", "nocolon"]);
        let Some(Commands::Debug(DebugCommand::Trace(args))) = cli.command else {
            panic!("expected trace");
        };
        assert!(args.header_pairs().is_err());
    }
}
