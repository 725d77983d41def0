//! telltale CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use telltale::cli::Cli;
use telltale::core::logging;
use telltale::storage::ResolvedConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Flag, then environment, then config file, then default.
    let log_level = cli
        .log_level
        .as_deref()
        .and_then(logging::LogLevel::from_arg)
        .or_else(logging::log_level_from_env)
        .or_else(|| {
            ResolvedConfig::resolve(&cli)
                .ok()
                .and_then(|config| config.log_level)
                .and_then(|level| logging::LogLevel::from_arg(&level))
        })
        .unwrap_or_default();
    let log_format = if cli.json_output {
        logging::LogFormat::Json
    } else {
        logging::log_format_from_env().unwrap_or_default()
    };
    logging::init(log_level, log_format, logging::log_file_from_env(), cli.verbose);

    let format = cli.effective_format();
    let no_color = cli.no_color;
    let pretty = cli.pretty;

    match telltale::cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            let error_output =
                telltale::render::error::render_error_full(&e, format, no_color, pretty);
            eprintln!("{error_output}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
