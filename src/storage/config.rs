//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux: `~/.config/telltale/config.toml`
//! - macOS: `~/Library/Application Support/dev.telltale.telltale/config.toml`
//! - Windows: `%APPDATA%/telltale/telltale/config/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `TELLTALE_FORMAT`: Output format (human, json, md)
//! - `TELLTALE_MAX_LOGS`: Capture buffer capacity
//! - `TELLTALE_TIMEOUT`: HTTP timeout in seconds
//! - `TELLTALE_NO_COLOR` or `NO_COLOR`: Disable colors
//! - `TELLTALE_VERBOSE`: Enable verbose output (1, true, yes)
//! - `TELLTALE_PRETTY`: Pretty-print JSON output (1, true, yes)
//! - `TELLTALE_CONFIG`: Override config file path
//! - `TELLTALE_DATA_DIR`: Override the directory holding `storage.json`

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::capture::CaptureSettings;
use crate::cli::args::{Cli, OutputFormat};
use crate::error::{Result, TelltaleError};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable for output format.
pub const ENV_FORMAT: &str = "TELLTALE_FORMAT";
/// Environment variable for capture buffer capacity.
pub const ENV_MAX_LOGS: &str = "TELLTALE_MAX_LOGS";
/// Environment variable for HTTP timeout in seconds.
pub const ENV_TIMEOUT: &str = "TELLTALE_TIMEOUT";
/// Environment variable to disable colors.
pub const ENV_NO_COLOR: &str = "TELLTALE_NO_COLOR";
/// Standard environment variable to disable colors.
pub const ENV_NO_COLOR_STD: &str = "NO_COLOR";
/// Environment variable for verbose output.
pub const ENV_VERBOSE: &str = "TELLTALE_VERBOSE";
/// Environment variable for pretty JSON.
pub const ENV_PRETTY: &str = "TELLTALE_PRETTY";
/// Environment variable for the config file path.
pub const ENV_CONFIG: &str = "TELLTALE_CONFIG";
/// Environment variable for the data directory.
pub const ENV_DATA_DIR: &str = "TELLTALE_DATA_DIR";

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Final configuration after merging every source.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub format: OutputFormat,
    pub no_color: bool,
    pub pretty: bool,
    pub verbose: bool,
    pub timeout: Duration,
    /// Diagnostic log level from `[general] log_level`.
    pub log_level: Option<String>,
    pub capture: CaptureSettings,
    pub retention_days: u32,
    /// Provider limits seeded from the config file.
    pub limits: BTreeMap<String, u64>,
    pub config_path: PathBuf,
    pub storage_path: PathBuf,
    pub sources: ConfigSources,
}

/// Where each resolved value came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub format: ConfigSource,
    pub no_color: ConfigSource,
    pub pretty: ConfigSource,
    pub verbose: ConfigSource,
    pub timeout: ConfigSource,
    pub max_logs: ConfigSource,
    pub storage_path: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI args, the process environment and
    /// the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but is invalid, or if an
    /// environment override does not parse.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        Self::resolve_with(cli, &AppPaths::new(), |name| std::env::var(name).ok())
    }

    /// Resolve against explicit default paths and an environment lookup.
    ///
    /// # Errors
    ///
    /// See [`ResolvedConfig::resolve`].
    pub fn resolve_with<E>(cli: &Cli, paths: &AppPaths, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let config_path = env(ENV_CONFIG).map_or_else(|| paths.config_file(), PathBuf::from);
        let config = Config::load_from(&config_path)?;
        config.validate()?;

        let mut sources = ConfigSources::default();
        let format = Self::resolve_format(cli, &config, &env, &mut sources.format)?;
        let no_color = Self::resolve_no_color(cli, &config, &env, &mut sources.no_color);
        let pretty = Self::resolve_flag(
            cli.pretty,
            &env,
            ENV_PRETTY,
            config.output.pretty,
            &mut sources.pretty,
        );
        let verbose = Self::resolve_flag(cli.verbose, &env, ENV_VERBOSE, false, &mut sources.verbose);
        let timeout = Self::resolve_timeout(&config, &env, &mut sources.timeout)?;

        let mut capture = config.capture.settings();
        if let Some(max_logs) = Self::env_number(&env, ENV_MAX_LOGS)? {
            sources.max_logs = ConfigSource::Env;
            capture.max_logs = usize::try_from(max_logs).unwrap_or(usize::MAX);
        } else {
            sources.max_logs = ConfigSource::ConfigFile;
        }
        if capture.max_logs == 0 {
            return Err(TelltaleError::ConfigInvalid {
                key: "capture.max_logs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        let storage_path = if let Some(dir) = env(ENV_DATA_DIR) {
            sources.storage_path = ConfigSource::Env;
            PathBuf::from(dir).join("storage.json")
        } else {
            paths.storage_file()
        };

        Ok(Self {
            format,
            no_color,
            pretty,
            verbose,
            timeout,
            log_level: config.general.log_level.clone(),
            capture,
            retention_days: config.usage.retention_days,
            limits: config.limits,
            config_path,
            storage_path,
            sources,
        })
    }

    fn resolve_format<E>(
        cli: &Cli,
        config: &Config,
        env: &E,
        source: &mut ConfigSource,
    ) -> Result<OutputFormat>
    where
        E: Fn(&str) -> Option<String>,
    {
        // 1. CLI --json flag (shorthand)
        if cli.json {
            *source = ConfigSource::Cli;
            return Ok(OutputFormat::Json);
        }

        // clap fills in a default for --format, so only a non-default value
        // counts as set on the command line.
        if cli.format != OutputFormat::Human {
            *source = ConfigSource::Cli;
            return Ok(cli.format);
        }

        // 2. Environment variable
        if let Some(format_env) = env(ENV_FORMAT) {
            *source = ConfigSource::Env;
            return parse_format(&format_env);
        }

        // 3. Config file
        if let Some(ref format_str) = config.output.format {
            *source = ConfigSource::ConfigFile;
            return parse_format(format_str);
        }

        // 4. Default
        *source = ConfigSource::Default;
        Ok(OutputFormat::Human)
    }

    fn resolve_no_color<E>(cli: &Cli, config: &Config, env: &E, source: &mut ConfigSource) -> bool
    where
        E: Fn(&str) -> Option<String>,
    {
        if cli.no_color {
            *source = ConfigSource::Cli;
            return true;
        }
        if is_truthy(env(ENV_NO_COLOR).as_deref()) || env(ENV_NO_COLOR_STD).is_some() {
            *source = ConfigSource::Env;
            return true;
        }
        if !config.output.color {
            *source = ConfigSource::ConfigFile;
            return true;
        }
        *source = ConfigSource::Default;
        false
    }

    fn resolve_flag<E>(
        cli_value: bool,
        env: &E,
        env_name: &str,
        file_value: bool,
        source: &mut ConfigSource,
    ) -> bool
    where
        E: Fn(&str) -> Option<String>,
    {
        if cli_value {
            *source = ConfigSource::Cli;
            return true;
        }
        if is_truthy(env(env_name).as_deref()) {
            *source = ConfigSource::Env;
            return true;
        }
        if file_value {
            *source = ConfigSource::ConfigFile;
            return true;
        }
        *source = ConfigSource::Default;
        false
    }

    fn resolve_timeout<E>(config: &Config, env: &E, source: &mut ConfigSource) -> Result<Duration>
    where
        E: Fn(&str) -> Option<String>,
    {
        if let Some(seconds) = Self::env_number(env, ENV_TIMEOUT)? {
            *source = ConfigSource::Env;
            return Ok(Duration::from_secs(seconds));
        }
        *source = ConfigSource::ConfigFile;
        Ok(Duration::from_secs(config.general.timeout_seconds))
    }

    fn env_number<E>(env: &E, name: &str) -> Result<Option<u64>>
    where
        E: Fn(&str) -> Option<String>,
    {
        env(name)
            .map(|raw| {
                raw.trim().parse::<u64>().map_err(|_| TelltaleError::ConfigInvalid {
                    key: name.to_string(),
                    message: format!("'{raw}' is not a non-negative integer"),
                })
            })
            .transpose()
    }
}

fn is_truthy(value: Option<&str>) -> bool {
    value.is_some_and(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn parse_format(s: &str) -> Result<OutputFormat> {
    match s.to_lowercase().as_str() {
        "human" => Ok(OutputFormat::Human),
        "json" => Ok(OutputFormat::Json),
        "md" | "markdown" => Ok(OutputFormat::Md),
        _ => Err(TelltaleError::Config(format!(
            "Invalid format '{s}'. Valid formats: human, json, md"
        ))),
    }
}

// =============================================================================
// Config File
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub capture: CaptureConfig,
    pub usage: UsageConfig,
    /// Provider identifier to token allowance.
    pub limits: BTreeMap<String, u64>,
    pub output: OutputConfig,
}

/// General settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// HTTP timeout in seconds.
    pub timeout_seconds: u64,
    pub log_level: Option<String>,
}

/// Capture pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub max_logs: usize,
    pub max_age_minutes: u64,
    pub prune_interval_seconds: u64,
    pub max_data_bytes: usize,
    pub capture_panics: bool,
}

/// Usage ledger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    pub retention_days: u32,
}

/// Output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: Option<String>,
    pub color: bool,
    pub pretty: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            log_level: None,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let defaults = CaptureSettings::default();
        Self {
            max_logs: defaults.max_logs,
            max_age_minutes: defaults.max_age.as_secs() / 60,
            prune_interval_seconds: defaults.prune_interval.as_secs(),
            max_data_bytes: defaults.max_data_bytes,
            capture_panics: defaults.capture_panics,
        }
    }
}

impl CaptureConfig {
    /// Runtime settings for the capture pipeline.
    #[must_use]
    pub const fn settings(&self) -> CaptureSettings {
        CaptureSettings {
            max_logs: self.max_logs,
            max_age: Duration::from_secs(self.max_age_minutes.saturating_mul(60)),
            prune_interval: Duration::from_secs(self.prune_interval_seconds),
            max_data_bytes: self.max_data_bytes,
            capture_panics: self.capture_panics,
        }
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            retention_days: crate::usage::DEFAULT_RETENTION_DAYS,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: None,
            color: true,
            pretty: false,
        }
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| TelltaleError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the write fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| TelltaleError::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| TelltaleError::ConfigInvalid {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.capture.max_logs == 0 {
            return Err(invalid("capture.max_logs", "must be greater than 0"));
        }
        if self.capture.max_age_minutes == 0 {
            return Err(invalid("capture.max_age_minutes", "must be greater than 0"));
        }
        if self.capture.prune_interval_seconds == 0 {
            return Err(invalid("capture.prune_interval_seconds", "must be greater than 0"));
        }
        if self.capture.max_data_bytes < crate::capture::truncate::MIN_GUARANTEED_BUDGET {
            return Err(invalid(
                "capture.max_data_bytes",
                &format!(
                    "must be at least {}",
                    crate::capture::truncate::MIN_GUARANTEED_BUDGET
                ),
            ));
        }
        if self.usage.retention_days == 0 {
            return Err(invalid("usage.retention_days", "must be greater than 0"));
        }
        if self.general.timeout_seconds == 0 || self.general.timeout_seconds > 300 {
            return Err(invalid(
                "general.timeout_seconds",
                "must be between 1 and 300 seconds",
            ));
        }
        if let Some(format) = &self.output.format {
            parse_format(format)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["telltale"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capture.max_logs, 100);
        assert_eq!(config.capture.max_age_minutes, 60);
        assert_eq!(config.usage.retention_days, 30);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let config = Config::load_from(Path::new("/nonexistent/path/config.toml")).expect("load");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_valid_toml() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[capture]
max_logs = 250
capture_panics = true

[limits]
openai = 100000
anthropic = 50000

[output]
color = false
"#
        )
        .expect("write");

        let config = Config::load_from(file.path()).expect("load");
        assert_eq!(config.capture.max_logs, 250);
        assert!(config.capture.capture_panics);
        assert_eq!(config.limits.get("openai"), Some(&100_000));
        assert!(!config.output.color);
        assert_eq!(config.capture.settings().max_age, Duration::from_secs(3600));
    }

    #[test]
    fn load_invalid_toml_returns_parse_error() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "this is not valid toml {{{{").expect("write");
        let err = Config::load_from(file.path()).expect_err("invalid");
        assert!(matches!(err, TelltaleError::ConfigParse { .. }));
    }

    #[test]
    fn roundtrip_save_load() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.limits.insert("openai".to_string(), 42);
        config.output.pretty = true;
        config.save_to(&path).expect("save");
        assert_eq!(Config::load_from(&path).expect("load"), config);
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.capture.max_logs = 0;
        let err = config.validate().expect_err("invalid");
        assert!(err.to_string().contains("capture.max_logs"));
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.capture.prune_interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_precedence_cli_over_env_over_file() {
        let dir = TempDir::new().expect("tempdir");
        let paths = AppPaths::rooted(dir.path());
        let mut config = Config::default();
        config.output.format = Some("md".to_string());
        config.save_to(&paths.config_file()).expect("save");

        let from_file = ResolvedConfig::resolve_with(&cli(&[]), &paths, env_from(&[])).expect("resolve");
        assert_eq!(from_file.format, OutputFormat::Md);
        assert_eq!(from_file.sources.format, ConfigSource::ConfigFile);

        let from_env = ResolvedConfig::resolve_with(&cli(&[]), &paths, env_from(&[(ENV_FORMAT, "json")]))
            .expect("resolve");
        assert_eq!(from_env.format, OutputFormat::Json);
        assert_eq!(from_env.sources.format, ConfigSource::Env);

        let from_cli = ResolvedConfig::resolve_with(
            &cli(&["--json"]),
            &paths,
            env_from(&[(ENV_FORMAT, "human")]),
        )
        .expect("resolve");
        assert_eq!(from_cli.format, OutputFormat::Json);
        assert_eq!(from_cli.sources.format, ConfigSource::Cli);

        let explicit = ResolvedConfig::resolve_with(
            &cli(&["--format", "md"]),
            &paths,
            env_from(&[(ENV_FORMAT, "json")]),
        )
        .expect("resolve");
        assert_eq!(explicit.format, OutputFormat::Md);
    }

    #[test]
    fn resolve_env_overrides() {
        let dir = TempDir::new().expect("tempdir");
        let paths = AppPaths::rooted(dir.path());
        let data_dir = dir.path().join("elsewhere");
        let resolved = ResolvedConfig::resolve_with(
            &cli(&[]),
            &paths,
            env_from(&[
                (ENV_MAX_LOGS, "7"),
                (ENV_NO_COLOR_STD, ""),
                (ENV_DATA_DIR, data_dir.to_str().expect("utf8")),
            ]),
        )
        .expect("resolve");
        assert_eq!(resolved.capture.max_logs, 7);
        assert_eq!(resolved.sources.max_logs, ConfigSource::Env);
        assert!(resolved.no_color);
        assert_eq!(resolved.storage_path, data_dir.join("storage.json"));
    }

    #[test]
    fn resolve_rejects_bad_env_number() {
        let dir = TempDir::new().expect("tempdir");
        let paths = AppPaths::rooted(dir.path());
        let err = ResolvedConfig::resolve_with(&cli(&[]), &paths, env_from(&[(ENV_MAX_LOGS, "lots")]))
            .expect_err("invalid");
        assert!(matches!(err, TelltaleError::ConfigInvalid { .. }));
    }

    #[test]
    fn config_path_env_override() {
        let dir = TempDir::new().expect("tempdir");
        let custom = dir.path().join("custom.toml");
        std::fs::write(&custom, "[usage]\nretention_days = 7\n").expect("write");
        let resolved = ResolvedConfig::resolve_with(
            &cli(&[]),
            &AppPaths::rooted(dir.path()),
            env_from(&[(ENV_CONFIG, custom.to_str().expect("utf8"))]),
        )
        .expect("resolve");
        assert_eq!(resolved.retention_days, 7);
        assert_eq!(resolved.config_path, custom);
    }
}
