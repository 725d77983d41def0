//! CLI argument parsing and command dispatch.

pub mod args;
pub mod debug;
pub mod limits;
pub mod session;
pub mod usage;

use std::time::Duration;

pub use args::{Cli, Commands, OutputFormat};
pub use session::Session;

use crate::cli::args::{DebugCommand, UsageArgs};
use crate::error::Result;
use crate::storage::ResolvedConfig;

/// Resolve configuration, open a session and run the selected command.
///
/// With no subcommand, shows usage for the default window.
///
/// # Errors
///
/// Returns the first error raised by configuration, storage or the command.
pub async fn run(cli: Cli) -> Result<()> {
    let config = ResolvedConfig::resolve(&cli)?;
    tracing::debug!(
        config = %config.config_path.display(),
        storage = %config.storage_path.display(),
        format = ?config.format,
        "resolved configuration"
    );

    let format = config.format;
    let pretty = config.pretty;
    let no_color = config.no_color || !crate::util::env::should_use_color(config.no_color);

    let timeout = match &cli.command {
        Some(Commands::Debug(DebugCommand::Trace(args))) => args.timeout.map(Duration::from_secs),
        _ => None,
    };
    let session = Session::open_with_timeout(config, timeout)?;

    match &cli.command {
        None => usage::execute(&UsageArgs::default(), &session, format, pretty, no_color),
        Some(Commands::Usage(args)) => usage::execute(args, &session, format, pretty, no_color),
        Some(Commands::Record(args)) => usage::record(args, &session, format, pretty, no_color),
        Some(Commands::Count(args)) => usage::count(args, &session, format, pretty, no_color),
        Some(Commands::Limits(cmd)) => limits::execute(cmd, &session, format, pretty, no_color),
        Some(Commands::Debug(cmd)) => {
            debug::execute(cmd, &session, format, pretty, no_color).await
        }
    }
}
