//! Debug capture commands.

use colored::Colorize;

use crate::cli::args::{DebugCommand, OutputFormat, TraceArgs};
use crate::cli::session::Session;
use crate::error::{Result, TelltaleError};
use crate::host::HttpRequest;
use crate::render::{self, RobotOutput, human, robot};

/// Execute a debug subcommand.
pub async fn execute(
    cmd: &DebugCommand,
    session: &Session,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<()> {
    let capture = session.capture();
    let command = match cmd {
        DebugCommand::Status => "debug status",
        DebugCommand::Enable => {
            capture.enable()?;
            "debug enable"
        }
        DebugCommand::Disable => {
            capture.disable();
            "debug disable"
        }
        DebugCommand::Trace(args) => return trace(args, session, format, pretty, no_color).await,
    };
    println!(
        "{}",
        render::render_debug_status(command, capture.is_enabled(), format, pretty, no_color)?
            .trim_end()
    );
    Ok(())
}

/// Send one request with capture on and report the entries it produced.
///
/// Human output streams matching entries as they are recorded. The persisted
/// flag is left as it was found.
async fn trace(
    args: &TraceArgs,
    session: &Session,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<()> {
    let mut request = HttpRequest::new(&args.method, &args.url);
    for (name, value) in args.header_pairs()? {
        request = request.with_header(name, value);
    }
    if let Some(body) = &args.body {
        request = request.with_body(body.as_bytes());
    }

    let capture = session.capture();
    let was_enabled = capture.is_enabled();
    capture.enable()?;

    let filter = args.filter();
    let live = (format == OutputFormat::Human).then(|| {
        capture.subscribe_filtered(filter.clone(), move |entry| {
            println!("{}", human::render_entry(entry, no_color));
        })
    });

    tracing::debug!(method = %request.method, url = %request.url, "tracing request");
    let outcome = session.host().fetch(request).await;
    drop(live);

    let entries = capture.snapshot_filtered(&filter);
    if !was_enabled {
        capture.disable();
    }

    let errors: Vec<String> = outcome.as_ref().err().map(ToString::to_string).into_iter().collect();
    match format {
        OutputFormat::Human => {
            let summary = match &outcome {
                Ok(response) => format!(
                    "HTTP {} ({} bytes), {} entries captured",
                    response.status,
                    response.body.len(),
                    entries.len()
                ),
                Err(_) => format!("Request failed, {} entries captured", entries.len()),
            };
            if no_color {
                println!("{summary}");
            } else {
                println!("{}", summary.dimmed());
            }
        }
        OutputFormat::Json => println!(
            "{}",
            robot::render_json(
                &RobotOutput::with_errors("debug trace", &entries, errors),
                pretty
            )?
        ),
        OutputFormat::Md => print!("{}", robot::render_entries_md(&entries)),
    }

    outcome.map(|_| ()).map_err(TelltaleError::from)
}
