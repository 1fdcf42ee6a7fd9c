//! Stage scheduler: turns the plan's stages into a live VU count.
//!
//! The target count at any instant comes from [`target_vus_at`], a pure
//! function of elapsed time. The [`drive`] loop samples it on every tick and
//! moves the [`VuPool`] toward it: new VUs get fresh ids, surplus VUs are
//! told to stop in LIFO order (last spawned, first retired) and finish their
//! current iteration.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::metrics::{builtin, MetricRegistry, TagSet};
use crate::plan::Stage;
use crate::threshold::ThresholdEvaluator;
use crate::vu::{vu_loop, ActiveVuCounter, VuContext};

/// Target number of VUs `elapsed` into the run.
///
/// Each stage ramps linearly from the previous stage's target (or
/// `start_vus` for the first stage) to its own target, rounding to the
/// nearest whole VU. A zero-duration stage is an instant jump. At or after
/// the end of the last stage the result is exactly the last target.
pub fn target_vus_at(stages: &[Stage], start_vus: u32, elapsed: Duration) -> u32 {
    let mut from = start_vus;
    let mut remaining = elapsed;
    for stage in stages {
        let length = stage.duration.as_duration();
        if remaining < length {
            let progress = remaining.as_secs_f64() / length.as_secs_f64();
            let from = f64::from(from);
            let value = from + (f64::from(stage.target) - from) * progress;
            return value.round().max(0.0) as u32;
        }
        remaining -= length;
        from = stage.target;
    }
    from
}

/// Lifecycle of a run's schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Pending,
    /// Inside the stage with this index.
    Running(usize),
    /// Schedule finished or stopped early; in-flight iterations are finishing.
    Draining,
    Done,
}

/// Stage bookkeeping for one run.
#[derive(Debug, Clone)]
pub struct StageScheduler {
    stages: Vec<Stage>,
    start_vus: u32,
    total: Duration,
    state: SchedulerState,
}

impl StageScheduler {
    pub fn new(stages: Vec<Stage>, start_vus: u32) -> Self {
        let total = stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration.as_duration()));
        Self {
            stages,
            start_vus,
            total,
            state: SchedulerState::Pending,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Sum of all stage durations.
    pub fn total_duration(&self) -> Duration {
        self.total
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn target_at(&self, elapsed: Duration) -> u32 {
        target_vus_at(&self.stages, self.start_vus, elapsed)
    }

    /// Index of the stage containing `elapsed`; zero-length stages never
    /// contain any instant.
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        let mut end = Duration::ZERO;
        for (idx, stage) in self.stages.iter().enumerate() {
            end = end.saturating_add(stage.duration.as_duration());
            if elapsed < end {
                return Some(idx);
            }
        }
        None
    }

    /// Moves the state forward for `elapsed`. Never moves backward.
    pub fn advance(&mut self, elapsed: Duration) -> SchedulerState {
        let next = match (self.state, self.stage_index_at(elapsed)) {
            (SchedulerState::Draining | SchedulerState::Done, _) => self.state,
            (_, Some(idx)) => SchedulerState::Running(idx),
            (_, None) => SchedulerState::Draining,
        };
        if next != self.state {
            match next {
                SchedulerState::Running(idx) => {
                    let stage = &self.stages[idx];
                    tracing::info!(
                        stage = idx + 1,
                        of = self.stages.len(),
                        target = stage.target,
                        duration = %stage.duration,
                        "entering stage"
                    );
                }
                SchedulerState::Draining => tracing::info!("schedule complete, draining"),
                _ => {}
            }
            self.state = next;
        }
        self.state
    }

    /// Stops the schedule early (iteration limit or interrupt).
    pub fn stop(&mut self) {
        if matches!(self.state, SchedulerState::Pending | SchedulerState::Running(_)) {
            self.state = SchedulerState::Draining;
        }
    }

    /// Marks draining as finished.
    pub fn finish(&mut self) {
        self.state = SchedulerState::Done;
    }
}

/// Live set of virtual users.
///
/// Every VU gets a child of `run_stop` as its stop token; the pool keeps
/// those tokens as a stack so retirement is LIFO.
pub struct VuPool {
    ctx: Arc<VuContext>,
    tracker: TaskTracker,
    run_stop: CancellationToken,
    interrupt: CancellationToken,
    active: ActiveVuCounter,
    live: Vec<CancellationToken>,
    next_id: u64,
    peak: usize,
}

impl VuPool {
    pub fn new(
        ctx: Arc<VuContext>,
        run_stop: CancellationToken,
        interrupt: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            tracker: TaskTracker::new(),
            run_stop,
            interrupt,
            active: ActiveVuCounter::new(),
            live: Vec::new(),
            next_id: 1,
            peak: 0,
        }
    }

    /// VUs not yet told to stop.
    pub fn live(&self) -> usize {
        self.live.len()
    }

    /// Highest live count seen.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Running VU tasks, including retiring ones.
    pub fn running(&self) -> u32 {
        self.active.get()
    }

    /// Spawns or retires VUs until `target` are live.
    pub fn scale_to(&mut self, target: usize) {
        while self.live.len() < target {
            let token = self.run_stop.child_token();
            self.tracker.spawn(vu_loop(
                self.next_id,
                Arc::clone(&self.ctx),
                token.clone(),
                self.interrupt.clone(),
                self.active.clone(),
            ));
            self.live.push(token);
            self.next_id += 1;
        }
        while self.live.len() > target {
            if let Some(token) = self.live.pop() {
                token.cancel();
            }
        }
        self.peak = self.peak.max(self.live.len());
    }

    /// Tells every VU to stop after its current iteration and waits up to
    /// `grace` for them. Returns `false` if the grace period ran out and the
    /// remaining iterations were interrupted.
    pub async fn drain(&mut self, grace: Duration) -> bool {
        self.scale_to(0);
        self.tracker.close();
        tokio::select! {
            _ = self.tracker.wait() => true,
            _ = tokio::time::sleep(grace) => {
                tracing::warn!(
                    running = self.active.get(),
                    grace = %humantime::format_duration(grace),
                    "graceful stop expired, interrupting remaining iterations"
                );
                self.interrupt.cancel();
                self.tracker.wait().await;
                false
            }
        }
    }
}

/// Why the schedule loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// All stages elapsed.
    Completed,
    /// `run_stop` fired: iteration limit reached or an interrupt.
    Stopped,
}

/// Runs the schedule until the last stage ends or `run_stop` fires.
///
/// On each tick the pool is scaled to the current target, the `vus` gauge is
/// updated and thresholds are re-evaluated against a fresh snapshot. The
/// loop also wakes exactly at the end of the schedule so the last stage is
/// not stretched by up to a tick.
pub async fn drive(
    scheduler: &mut StageScheduler,
    pool: &mut VuPool,
    registry: &MetricRegistry,
    evaluator: &mut ThresholdEvaluator,
    run_stop: &CancellationToken,
    tick: Duration,
) -> StopReason {
    let started = Instant::now();
    let end = started.checked_add(scheduler.total_duration());
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let no_tags = TagSet::new();

    let reason = loop {
        tokio::select! {
            biased;
            _ = run_stop.cancelled() => break StopReason::Stopped,
            _ = ticker.tick() => {}
            _ = sleep_until_end(end), if end.is_some_and(|end| Instant::now() < end) => {}
        }

        let elapsed = started.elapsed();
        let draining = scheduler.advance(elapsed) == SchedulerState::Draining;
        // At the end wake this lands on the last stage's target.
        pool.scale_to(scheduler.target_at(elapsed) as usize);
        registry.emit(builtin::VUS, pool.live() as f64, &no_tags);
        if draining {
            break StopReason::Completed;
        }

        let breached = evaluator.observe(&registry.snapshot_at(elapsed));
        tracing::debug!(
            vus = pool.live(),
            running = pool.running(),
            breached,
            "tick"
        );
    };

    scheduler.stop();
    reason
}

async fn sleep_until_end(end: Option<Instant>) {
    match end {
        Some(end) => tokio::time::sleep_until(end).await,
        None => std::future::pending().await,
    }
}
