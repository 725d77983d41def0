//! Provider limit commands.

use crate::cli::args::{LimitsCommand, OutputFormat};
use crate::cli::session::Session;
use crate::error::{Result, TelltaleError};
use crate::render;

/// Execute a limits subcommand. Every subcommand prints the resulting limits.
pub fn execute(
    cmd: &LimitsCommand,
    session: &Session,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<()> {
    let ledger = session.ledger();
    match cmd {
        LimitsCommand::List => {}
        LimitsCommand::Set { provider, tokens } => {
            if provider.trim().is_empty() {
                return Err(TelltaleError::ConfigInvalid {
                    key: "provider".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
            ledger.set_limit(provider, *tokens)?;
        }
        LimitsCommand::Remove { provider } => {
            if !ledger.remove_limit(provider)? {
                tracing::info!(%provider, "no limit configured");
            }
        }
    }
    println!(
        "{}",
        render::render_limits(&ledger.limits(), format, pretty, no_color)?.trim_end()
    );
    Ok(())
}
