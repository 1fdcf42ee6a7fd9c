//! `stampede run` command implementation.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};

use stampede::engine::LoadTestEngine;
use stampede::report::{write_report, RunSummary};
use stampede::summary::render_summary;

use super::{load_plan, PlanOverrides, EXIT_THRESHOLDS_FAILED};

pub struct RunOptions {
    pub plan: PathBuf,
    pub overrides: PlanOverrides,
    pub iterations: Option<u64>,
    pub out: Option<PathBuf>,
    pub no_color: bool,
    pub quiet: bool,
}

/// Execute the `run` command.
///
/// Loads the plan, applies overrides, runs the engine, then prints the text
/// summary to stderr and the JSON summary to stdout. Nothing is printed to
/// stdout when the plan is invalid.
pub async fn execute_run(options: RunOptions) -> Result<ExitCode> {
    let plan = load_plan(&options.plan, &options.overrides)
        .with_context(|| format!("Invalid plan '{}'", options.plan.display()))?;
    let trend_stats = plan.trend_stats()?;

    if options.no_color || !std::io::stderr().is_terminal() {
        colored::control::set_override(false);
    }

    let mut engine = LoadTestEngine::new(plan);
    if let Some(n) = options.iterations {
        engine = engine.with_iterations(n);
    }

    let outcome = engine.run().await.context("Load test failed")?;
    let summary = RunSummary::from_outcome(&outcome, &trend_stats);

    if !options.quiet {
        eprintln!("{}", render_summary(&summary));
    }
    println!("{}", summary.to_json()?);

    if let Some(path) = &options.out {
        match write_report(&summary, path) {
            Ok(()) => eprintln!("Summary written to: {}", path.display()),
            // Non-fatal: the summary is already on stdout
            Err(e) => eprintln!("Warning: {e}"),
        }
    }

    Ok(if summary.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_THRESHOLDS_FAILED)
    })
}
