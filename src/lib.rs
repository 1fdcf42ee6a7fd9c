//! Stampede: a stage-driven HTTP load generator.
//!
//! A [`plan::TestPlan`] describes how many virtual users to run over time
//! (stages), what each of them does per iteration (requests, checks,
//! pauses), and which pass/fail criteria (thresholds) decide the outcome.
//! [`engine::LoadTestEngine`] runs the plan, streaming every sample into a
//! concurrent [`metrics::MetricRegistry`], and returns a
//! [`engine::RunOutcome`] from which [`report::RunSummary`] is built.
//!
//! ```no_run
//! use stampede::engine::LoadTestEngine;
//! use stampede::plan::TestPlan;
//!
//! # async fn demo() -> Result<(), stampede::error::LoadTestError> {
//! let plan = TestPlan::load(std::path::Path::new("stampede.toml"))?;
//! let outcome = LoadTestEngine::new(plan).run().await?;
//! println!("passed: {}", outcome.passed());
//! # Ok(())
//! # }
//! ```

pub mod check;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod plan;
pub mod report;
pub mod scheduler;
pub mod summary;
pub mod threshold;
pub mod transport;
pub mod vu;
