//! CLI entry point for the probabilistic clustering engine.
//!
//! Parses command-line arguments with clap, initialises logging from the
//! parsed flags, executes the requested clustering engine, renders the
//! summary to stdout, and maps errors to appropriate exit codes.

use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use probcluster_cli::cli::{Cli, CliError, Command, render_summary, run_cli};
use probcluster_cli::logging::{self, LogRequest, LoggingError};

/// Parse CLI arguments, initialise logging, execute the command, and render
/// the summary.
fn try_main() -> Result<(), CliError> {
    let cli = Cli::parse();

    let Command::Run(args) = &cli.command;
    let request = LogRequest {
        debug: args.debug,
        trace: args.trace,
    };
    if let Err(err) = logging::init_logging(request) {
        report_logging_init_error(&err);
    }

    let summary = run_cli(cli)?;
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    // Writing the human-readable summary to stdout is best-effort: a broken
    // pipe here should not be reported as a clustering or report failure.
    let _ = render_summary(&summary, &mut writer);
    let _ = writer.flush();
    Ok(())
}

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(
                error = %err,
                code = err.code().as_str(),
                graph_io_code = ?err.graph_io_code().map(|c| c.as_str()),
                clustering_code = ?err.clustering_code().map(|c| c.as_str()),
                "command execution failed"
            );
            ExitCode::FAILURE
        }
    }
}

/// Emit a fallback diagnostic to stderr when tracing initialization fails.
#[expect(
    clippy::print_stderr,
    reason = "emit one-off diagnostic before tracing is initialized"
)]
fn report_logging_init_error(err: &LoggingError) {
    eprintln!("failed to initialize logging: {err}");
}
