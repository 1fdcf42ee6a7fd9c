//! Load test execution engine.
//!
//! [`LoadTestEngine`] is the top-level orchestrator that:
//! - Validates the plan and builds the metric registry and threshold set
//! - Runs the stage scheduler, which spawns and retires virtual users
//! - Drains in-flight iterations within the graceful-stop window
//! - Evaluates thresholds against the final snapshot
//!
//! Configuration problems are reported before any request is sent.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::LoadTestError;
use crate::metrics::{builtin, MetricRegistry, RegistrySnapshot, TagSet};
use crate::plan::{Stage, TestPlan};
use crate::scheduler::{self, StageScheduler, StopReason, VuPool};
use crate::threshold::{ThresholdEvaluator, Verdict};
use crate::transport::{ReqwestTransport, Transport};
use crate::vu::VuContext;

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// Final metrics, taken after all VUs stopped.
    pub snapshot: RegistrySnapshot,
    /// Threshold results against `snapshot`.
    pub verdict: Verdict,
    /// Wall-clock run time, drain included.
    pub elapsed: Duration,
    /// The run was stopped by Ctrl+C.
    pub interrupted: bool,
    /// Some iterations were cut off when the graceful stop expired.
    pub forced_stop: bool,
    /// The stages that were scheduled.
    pub stages: Vec<Stage>,
    /// Base URL requests were resolved against.
    pub base_url: Option<String>,
}

impl RunOutcome {
    pub fn passed(&self) -> bool {
        self.verdict.passed
    }
}

/// Top-level load test engine configuration and entry point.
pub struct LoadTestEngine {
    plan: TestPlan,
    transport: Option<Arc<dyn Transport>>,
    max_iterations: Option<u64>,
    handle_signals: bool,
}

impl LoadTestEngine {
    /// Creates a new engine for `plan`.
    pub fn new(plan: TestPlan) -> Self {
        Self {
            plan,
            transport: None,
            max_iterations: None,
            handle_signals: true,
        }
    }

    /// Replaces the default reqwest transport.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets an iteration limit. The test stops after this many total iterations
    /// across all VUs (first-limit-wins with the stage schedule).
    pub fn with_iterations(mut self, n: u64) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Overrides the plan's base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.plan.base_url = Some(base_url.into());
        self
    }

    /// Enables or disables the Ctrl+C handler (on by default).
    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    pub fn plan(&self) -> &TestPlan {
        &self.plan
    }

    pub fn max_iterations(&self) -> Option<u64> {
        self.max_iterations
    }

    /// Runs the load test to completion.
    ///
    /// Returns `Err` only for configuration problems, which are detected
    /// before the first request. A breached threshold is a normal outcome
    /// with `verdict.passed == false`.
    pub async fn run(self) -> Result<RunOutcome, LoadTestError> {
        self.plan.validate()?;
        if self.max_iterations == Some(0) {
            return Err(LoadTestError::validation("iteration limit must be at least 1"));
        }

        let registry = Arc::new(self.plan.build_registry()?);
        let mut evaluator =
            ThresholdEvaluator::new(self.plan.threshold_expressions(&registry)?);

        let plan = Arc::new(self.plan);
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()),
        };

        // run_stop is a child of signal so a Ctrl+C stops VUs too, while the
        // iteration limit only cancels run_stop.
        let signal = CancellationToken::new();
        let run_stop = signal.child_token();
        let interrupt = CancellationToken::new();

        let mut ctx = VuContext::new(
            Arc::clone(&plan),
            Arc::clone(&registry),
            transport,
            run_stop.clone(),
        )?;
        if let Some(max) = self.max_iterations {
            ctx = ctx.with_iteration_budget(max);
        }

        let signals = self
            .handle_signals
            .then(|| tokio::spawn(handle_ctrl_c(signal.clone())));

        let started = Instant::now();
        let no_tags = TagSet::new();
        registry.emit(builtin::VUS_MAX, f64::from(plan.max_vus()), &no_tags);

        let mut stage_scheduler =
            StageScheduler::new(plan.stages.clone(), plan.settings.start_vus);
        let mut pool = VuPool::new(Arc::new(ctx), run_stop.clone(), interrupt);

        tracing::info!(
            stages = plan.stages.len(),
            duration = %humantime::format_duration(stage_scheduler.total_duration()),
            max_vus = plan.max_vus(),
            thresholds = evaluator.thresholds().len(),
            "starting load test"
        );

        let reason = scheduler::drive(
            &mut stage_scheduler,
            &mut pool,
            &registry,
            &mut evaluator,
            &run_stop,
            plan.settings.tick.as_duration(),
        )
        .await;
        if reason == StopReason::Stopped {
            tracing::info!("run stopped before the schedule ended");
        }

        let drained = pool.drain(plan.settings.graceful_stop.as_duration()).await;
        stage_scheduler.finish();
        registry.emit(builtin::VUS, 0.0, &no_tags);

        if let Some(handle) = signals {
            handle.abort();
        }

        let elapsed = started.elapsed();
        let snapshot = registry.snapshot_at(elapsed);
        let verdict = evaluator.verdict(&snapshot);
        if verdict.passed {
            tracing::info!("all thresholds passed");
        } else {
            let failed = verdict.results.iter().filter(|r| !r.passed).count();
            tracing::warn!(failed, "thresholds breached");
        }

        Ok(RunOutcome {
            snapshot,
            verdict,
            elapsed,
            interrupted: signal.is_cancelled(),
            forced_stop: !drained,
            stages: plan.stages.clone(),
            base_url: plan.base_url.clone(),
        })
    }
}

/// Validates `plan` and returns its registry without running anything.
pub fn dry_run(plan: &TestPlan) -> Result<MetricRegistry, LoadTestError> {
    plan.validate()?;
    plan.build_registry()
}

/// Ctrl+C handler with two-phase shutdown.
///
/// First Ctrl+C triggers graceful drain via the cancellation token.
/// Second Ctrl+C performs a hard abort via `std::process::exit(1)`.
async fn handle_ctrl_c(cancel: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {err}");
        return;
    }
    eprintln!("\nReceived Ctrl+C, stopping gracefully...");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\nReceived second Ctrl+C, aborting immediately.");
        std::process::exit(1);
    }
}
