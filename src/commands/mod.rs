//! `stampede` CLI subcommands.
//!
//! Provides `run` (execute a plan), `validate` (check a plan without sending
//! traffic) and `init` (generate a starter plan).

mod init;
mod run;
mod validate;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand};

use stampede::error::LoadTestError;
use stampede::plan::{PlanDuration, Stage, TestPlan};

/// Exit code when the run completed but a threshold failed.
pub const EXIT_THRESHOLDS_FAILED: u8 = 99;
/// Exit code when the plan could not be loaded or is invalid.
pub const EXIT_INVALID_PLAN: u8 = 104;

/// Prefix of environment variables that set plan variables.
const VAR_ENV_PREFIX: &str = "STAMPEDE_VAR_";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test
    ///
    /// Validates the plan, runs it, prints a human-readable summary to
    /// stderr and the JSON summary to stdout.
    Run {
        /// Path to the plan (.toml or .json)
        plan: PathBuf,

        #[command(flatten)]
        overrides: PlanOverrides,

        /// Stop after this many iterations across all VUs
        #[arg(long)]
        iterations: Option<u64>,

        /// Also write the JSON summary to this file
        #[arg(long)]
        out: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Skip the human-readable summary
        #[arg(long, short)]
        quiet: bool,
    },

    /// Parse and validate a plan without sending any request
    Validate {
        /// Path to the plan (.toml or .json)
        plan: PathBuf,

        #[command(flatten)]
        overrides: PlanOverrides,
    },

    /// Generate a starter plan
    Init {
        /// Where to write the plan
        #[arg(default_value = "stampede.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Command-line changes applied on top of a loaded plan.
#[derive(Debug, Default, Clone, Args)]
pub struct PlanOverrides {
    /// Base URL for relative request URLs (overrides the plan)
    #[arg(long, env = "STAMPEDE_BASE_URL")]
    pub base_url: Option<String>,

    /// Run this many VUs flat, replacing the plan's stages
    #[arg(long)]
    pub vus: Option<u32>,

    /// Run for this long flat (e.g. "30s", "2m"), replacing the plan's stages
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<PlanDuration>,

    /// Set a plan variable, repeatable: --var user_id=42
    #[arg(long = "var", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,
}

impl Command {
    /// Execute the selected subcommand.
    pub fn execute(self) -> Result<ExitCode> {
        match self {
            Command::Run {
                plan,
                overrides,
                iterations,
                out,
                no_color,
                quiet,
            } => {
                let runtime = tokio::runtime::Runtime::new()?;
                runtime.block_on(run::execute_run(run::RunOptions {
                    plan,
                    overrides,
                    iterations,
                    out,
                    no_color,
                    quiet,
                }))
            }
            Command::Validate { plan, overrides } => validate::execute_validate(&plan, &overrides),
            Command::Init { path, force } => init::execute_init(&path, force),
        }
    }
}

/// Maps an error to a process exit code.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<LoadTestError>() {
        Some(e) if e.is_configuration() => EXIT_INVALID_PLAN,
        _ => 1,
    }
}

/// Loads a plan, applies CLI and environment overrides, then validates it.
pub fn load_plan(path: &std::path::Path, overrides: &PlanOverrides) -> Result<TestPlan, LoadTestError> {
    let mut plan = TestPlan::read(path)?;
    apply_overrides(&mut plan, overrides, std::env::vars());
    plan.validate()?;
    Ok(plan)
}

/// Apply CLI flag overrides to a loaded plan.
///
/// `--vus` and `--duration` replace the stages with a single flat stage; a
/// missing half is taken from the plan. Variables come from `env` first
/// (`STAMPEDE_VAR_<NAME>`), then `--var`, so the command line wins.
pub fn apply_overrides(
    plan: &mut TestPlan,
    overrides: &PlanOverrides,
    env: impl IntoIterator<Item = (String, String)>,
) {
    if let Some(base_url) = &overrides.base_url {
        plan.base_url = Some(base_url.clone());
    }

    if overrides.vus.is_some() || overrides.duration.is_some() {
        let vus = overrides.vus.unwrap_or_else(|| plan.max_vus());
        let duration = overrides
            .duration
            .map_or_else(|| plan.total_duration(), |d| d.as_duration());
        if !plan.stages.is_empty() {
            tracing::info!(
                replaced = plan.stages.len(),
                vus,
                "replacing plan stages with a flat stage"
            );
        }
        plan.stages = vec![Stage::new(duration, vus)];
        plan.settings.start_vus = vus;
    }

    for (key, value) in env {
        if let Some(name) = key.strip_prefix(VAR_ENV_PREFIX) {
            if !name.is_empty() {
                plan.variables.insert(name.to_string(), value);
            }
        }
    }
    for (name, value) in &overrides.vars {
        plan.variables.insert(name.clone(), value.clone());
    }
}

fn parse_duration(raw: &str) -> Result<PlanDuration, String> {
    PlanDuration::parse(raw).map_err(|e| format!("invalid duration '{raw}': {e}"))
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}
