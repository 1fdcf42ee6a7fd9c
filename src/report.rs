//! Structured run summary and JSON export.
//!
//! [`RunSummary`] is the single machine-readable result of a run: every
//! metric with its aggregate values, every threshold verdict, and per-check
//! tallies. It is printed to stdout after every completed run, whether the
//! thresholds passed or not.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::engine::RunOutcome;
use crate::error::LoadTestError;
use crate::metrics::{AggregateSnapshot, RegistrySnapshot};
use crate::threshold::{Aggregation, ThresholdResult};

/// Schema version for the JSON summary format.
///
/// Increment when making breaking changes to the summary structure.
const SCHEMA_VERSION: &str = "1.0";

/// Top-level JSON summary structure.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// Summary format version for parser compatibility.
    pub schema_version: String,
    /// RFC 3339 timestamp when the summary was generated.
    pub timestamp: String,
    /// Actual run time in seconds, drain included.
    pub elapsed_secs: f64,
    /// `true` when every threshold passed.
    pub passed: bool,
    /// Stopped by Ctrl+C before the schedule finished.
    pub interrupted: bool,
    /// Some iterations were cut off when the graceful stop expired.
    pub forced_stop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub stages: Vec<StageReport>,
    /// Metrics and sub-metrics keyed by `name` or `name{tag:value}`.
    pub metrics: BTreeMap<String, MetricReport>,
    pub thresholds: Vec<ThresholdResult>,
    pub checks: Vec<CheckReport>,
}

#[derive(Debug, Serialize)]
pub struct StageReport {
    /// Human-readable duration, e.g. `"1m 30s"`.
    pub duration: String,
    pub target: u32,
}

/// Aggregate values of one metric, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricReport {
    Counter {
        count: f64,
        /// Per second of run time.
        rate: f64,
    },
    Gauge {
        value: Option<f64>,
        min: Option<f64>,
        max: Option<f64>,
    },
    Rate {
        rate: Option<f64>,
        passes: u64,
        fails: u64,
    },
    Trend {
        count: u64,
        /// One entry per configured trend stat (`avg`, `p(95)`, ...); `null`
        /// when the trend has no samples.
        values: BTreeMap<String, Option<f64>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub group: String,
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl MetricReport {
    fn from_snapshot(snapshot: &AggregateSnapshot, trend_stats: &[Aggregation]) -> Self {
        match snapshot {
            AggregateSnapshot::Counter(c) => Self::Counter {
                count: c.count,
                rate: c.rate,
            },
            AggregateSnapshot::Gauge(g) => Self::Gauge {
                value: g.value,
                min: g.min,
                max: g.max,
            },
            AggregateSnapshot::Rate(r) => Self::Rate {
                rate: r.rate(),
                passes: r.passes,
                fails: r.fails(),
            },
            AggregateSnapshot::Trend(t) => Self::Trend {
                count: t.count,
                values: trend_stats
                    .iter()
                    .map(|stat| (stat.to_string(), stat.measure(snapshot)))
                    .collect(),
            },
        }
    }
}

impl RunSummary {
    /// Builds the summary of a finished run. `trend_stats` selects which
    /// aggregates are reported for trends.
    pub fn from_outcome(outcome: &RunOutcome, trend_stats: &[Aggregation]) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            elapsed_secs: outcome.elapsed.as_secs_f64(),
            passed: outcome.verdict.passed,
            interrupted: outcome.interrupted,
            forced_stop: outcome.forced_stop,
            base_url: outcome.base_url.clone(),
            stages: outcome
                .stages
                .iter()
                .map(|s| StageReport {
                    duration: s.duration.to_string(),
                    target: s.target,
                })
                .collect(),
            metrics: metric_reports(&outcome.snapshot, trend_stats),
            thresholds: outcome.verdict.results.clone(),
            checks: outcome
                .snapshot
                .checks
                .iter()
                .map(|c| CheckReport {
                    group: c.group.clone(),
                    name: c.name.clone(),
                    passes: c.passes,
                    fails: c.fails,
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn metric_reports(
    snapshot: &RegistrySnapshot,
    trend_stats: &[Aggregation],
) -> BTreeMap<String, MetricReport> {
    snapshot
        .metrics
        .iter()
        .map(|(key, agg)| (key.clone(), MetricReport::from_snapshot(agg, trend_stats)))
        .collect()
}

/// Writes the summary as pretty JSON to `path`, creating parent directories.
pub fn write_report(summary: &RunSummary, path: &Path) -> Result<(), LoadTestError> {
    let io_err = |source| LoadTestError::ReportIo {
        source,
        path: path.display().to_string(),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = summary.to_json().map_err(|e| io_err(std::io::Error::other(e)))?;
    std::fs::write(path, json).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{builtin, MetricRegistry, TagSet};
    use crate::plan::Stage;
    use crate::threshold::Verdict;
    use std::time::Duration;

    fn outcome() -> RunOutcome {
        let registry = MetricRegistry::with_builtins();
        let tags = TagSet::new().with("group", "Users");
        for ms in [100.0, 200.0, 300.0] {
            registry.record(builtin::HTTP_REQ_DURATION, ms, &tags).unwrap();
            registry.record(builtin::HTTP_REQS, 1.0, &tags).unwrap();
        }
        registry.record(builtin::ERRORS, 0.0, &tags).unwrap();
        registry.record(builtin::ERRORS, 1.0, &tags).unwrap();
        registry.record_check("Users", "status ok", true, &tags);
        registry.record_check("Users", "status ok", false, &tags);

        RunOutcome {
            snapshot: registry.snapshot_at(Duration::from_secs(3)),
            verdict: Verdict {
                results: vec![ThresholdResult {
                    metric: "errors".to_string(),
                    expression: "rate<0.1".to_string(),
                    measured: Some(0.5),
                    passed: false,
                }],
                passed: false,
            },
            elapsed: Duration::from_secs(3),
            interrupted: false,
            forced_stop: false,
            stages: vec![Stage::new(Duration::from_secs(90), 5)],
            base_url: Some("http://api.test".to_string()),
        }
    }

    fn stats() -> Vec<Aggregation> {
        vec![Aggregation::Avg, Aggregation::Max, Aggregation::Percentile(95.0)]
    }

    #[test]
    fn test_summary_schema_and_verdict() {
        let summary = RunSummary::from_outcome(&outcome(), &stats());
        assert_eq!(summary.schema_version, "1.0");
        assert!(!summary.passed);
        assert_eq!(summary.thresholds.len(), 1);
        assert_eq!(summary.stages[0].duration, "1m 30s");
    }

    #[test]
    fn test_summary_metric_values() {
        let summary = RunSummary::from_outcome(&outcome(), &stats());
        assert_eq!(
            summary.metrics["http_reqs"],
            MetricReport::Counter {
                count: 3.0,
                rate: 1.0
            }
        );
        assert_eq!(
            summary.metrics["errors"],
            MetricReport::Rate {
                rate: Some(0.5),
                passes: 1,
                fails: 1
            }
        );
        let MetricReport::Trend { count, values } = &summary.metrics["http_req_duration"] else {
            panic!("http_req_duration should be a trend");
        };
        assert_eq!(*count, 3);
        assert_eq!(values["avg"], Some(200.0));
        assert_eq!(values["max"], Some(300.0));
        assert!(values.contains_key("p(95)"));
    }

    #[test]
    fn test_empty_trend_reports_null_stats() {
        let summary = RunSummary::from_outcome(&outcome(), &stats());
        let MetricReport::Trend { count, values } = &summary.metrics["iteration_duration"] else {
            panic!("iteration_duration should be a trend");
        };
        assert_eq!(*count, 0);
        assert!(values.values().all(Option::is_none));
    }

    #[test]
    fn test_json_shape() {
        let json = RunSummary::from_outcome(&outcome(), &stats()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["metrics"]["errors"]["type"], "rate");
        assert_eq!(value["checks"][0]["group"], "Users");
        assert_eq!(value["checks"][0]["fails"], 1);
        assert_eq!(value["thresholds"][0]["measured"], 0.5);
        assert_eq!(value["base_url"], "http://api.test");
    }

    #[test]
    fn test_write_report_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.json");
        let summary = RunSummary::from_outcome(&outcome(), &stats());

        write_report(&summary, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"schema_version\": \"1.0\""));
    }
}
