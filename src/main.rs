//! stampede: stage-driven HTTP load generator.
//!
//! Exit codes: `0` all thresholds passed, `99` a threshold failed, `104` the
//! plan is invalid, `1` any other error.

use std::process::ExitCode;

use clap::{ArgAction, Parser};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// Stage-driven HTTP load generator with threshold verdicts
#[derive(Parser)]
#[command(name = "stampede")]
#[command(about = "Run staged HTTP load tests and gate on thresholds", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command.execute() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(commands::exit_code_for(&err))
        }
    }
}

/// Logs go to stderr; stdout is reserved for the JSON summary.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("warn,stampede={level}").into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}
