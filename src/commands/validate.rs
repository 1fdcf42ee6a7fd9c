//! `stampede validate` command implementation.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use stampede::engine::dry_run;

use super::{load_plan, PlanOverrides};

/// Parse and validate a plan, report what it would run, send nothing.
pub fn execute_validate(path: &Path, overrides: &PlanOverrides) -> Result<ExitCode> {
    let plan = load_plan(path, overrides)
        .with_context(|| format!("Invalid plan '{}'", path.display()))?;
    let registry =
        dry_run(&plan).with_context(|| format!("Invalid plan '{}'", path.display()))?;

    let thresholds: usize = plan.thresholds.values().map(Vec::len).sum();
    let metrics = registry.snapshot().metrics.len();
    eprintln!("Plan '{}' is valid", path.display());
    eprintln!(
        "  stages: {} over {} (max {} VUs)",
        plan.stages.len(),
        humantime::format_duration(plan.total_duration()),
        plan.max_vus()
    );
    eprintln!("  steps: {}", plan.iteration.steps.len());
    eprintln!("  metrics: {metrics}, thresholds: {thresholds}");

    Ok(ExitCode::SUCCESS)
}
