//! Usage, record and count commands.

use crate::cli::args::{CountArgs, OutputFormat, RecordArgs, UsageArgs};
use crate::cli::session::Session;
use crate::error::{Result, TelltaleError};
use crate::render;
use crate::usage::{ChatMessage, UsageCounter, UsageEvent, default_counter};

/// Execute the usage command.
pub fn execute(
    args: &UsageArgs,
    session: &Session,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<()> {
    let stats = session.ledger().query(args.window);
    tracing::debug!(window = %args.window, used = stats.used, total = stats.total, "aggregated usage");
    println!("{}", render::render_usage(&stats, format, pretty, no_color)?.trim_end());
    Ok(())
}

/// Execute the record command.
pub fn record(
    args: &RecordArgs,
    session: &Session,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<()> {
    let event = UsageEvent::new(&args.provider, &args.model, args.prompt, args.completion);
    session.ledger().record(event.clone())?;
    println!(
        "{}",
        render::render_event("record", &event, format, pretty, no_color)?.trim_end()
    );
    Ok(())
}

/// Execute the count command.
pub fn count(
    args: &CountArgs,
    session: &Session,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(&args.transcript)?;
    let messages: Vec<ChatMessage> =
        serde_json::from_str(&raw).map_err(|e| TelltaleError::ConfigParse {
            path: args.transcript.display().to_string(),
            message: e.to_string(),
        })?;

    let counter = UsageCounter::new(default_counter(), session.ledger());
    let event = if args.dry_run {
        let (prompt, completion) = counter.count(&messages);
        UsageEvent::new(&args.provider, &args.model, prompt, completion)
    } else {
        counter.record_exchange(&args.provider, &args.model, &messages)?
    };

    println!(
        "{}",
        render::render_event("count", &event, format, pretty, no_color)?.trim_end()
    );
    Ok(())
}
