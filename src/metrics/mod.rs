//! Metric registry: typed, concurrently writable aggregates.
//!
//! A [`MetricRegistry`] owns every metric for the lifetime of a run. Virtual
//! users share it through an `Arc` and write samples with [`MetricRegistry::record`];
//! the scheduler and the threshold evaluator read it through
//! [`MetricRegistry::snapshot_at`].
//!
//! # Design
//!
//! - **No global lock**: the name table is a [`DashMap`]; each metric keeps
//!   its own striped or lock-free accumulation cells (see [`aggregate`]).
//! - **Bounded memory**: trends summarize into an HdrHistogram (3 significant
//!   figures, auto-resize) instead of keeping raw samples.
//! - **Sub-metrics**: a metric can carry tag-selected children
//!   (`http_req_duration{group:Users}`), fed by every parent sample whose tags
//!   match. Children are declared before the run starts.

mod aggregate;
mod snapshot;
mod tags;

pub use snapshot::{
    AggregateSnapshot, CheckTally, CounterSnapshot, GaugeSnapshot, RateSnapshot,
    RegistrySnapshot, TrendSnapshot,
};
pub use tags::{MetricKey, TagSelector, TagSet};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use aggregate::Aggregate;

/// Names of the metrics every registry starts with.
pub mod builtin {
    pub const HTTP_REQS: &str = "http_reqs";
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    pub const ERRORS: &str = "errors";
    pub const CHECKS: &str = "checks";
    pub const DATA_RECEIVED: &str = "data_received";
    pub const ITERATIONS: &str = "iterations";
    pub const ITERATION_DURATION: &str = "iteration_duration";
    pub const GROUP_DURATION: &str = "group_duration";
    pub const VUS: &str = "vus";
    pub const VUS_MAX: &str = "vus_max";
}

const BUILTIN_METRICS: &[(&str, MetricKind)] = &[
    (builtin::HTTP_REQS, MetricKind::Counter),
    (builtin::HTTP_REQ_DURATION, MetricKind::Trend),
    (builtin::HTTP_REQ_FAILED, MetricKind::Rate),
    (builtin::ERRORS, MetricKind::Rate),
    (builtin::CHECKS, MetricKind::Rate),
    (builtin::DATA_RECEIVED, MetricKind::Counter),
    (builtin::ITERATIONS, MetricKind::Counter),
    (builtin::ITERATION_DURATION, MetricKind::Trend),
    (builtin::GROUP_DURATION, MetricKind::Trend),
    (builtin::VUS, MetricKind::Gauge),
    (builtin::VUS_MAX, MetricKind::Gauge),
];

/// The four metric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonically accumulated sum.
    Counter,
    /// Last written value; supports relative add/subtract.
    Gauge,
    /// Fraction of true observations.
    Rate,
    /// Distribution summary (min, max, mean, percentiles).
    Trend,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Rate => "rate",
            Self::Trend => "trend",
        };
        f.write_str(s)
    }
}

struct SubMetric {
    key: String,
    selector: TagSelector,
    aggregate: Aggregate,
}

struct Metric {
    kind: MetricKind,
    aggregate: Aggregate,
    submetrics: RwLock<Vec<SubMetric>>,
}

impl Metric {
    fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            aggregate: Aggregate::new(kind),
            submetrics: RwLock::new(Vec::new()),
        }
    }

    fn write(&self, tags: &TagSet, f: impl Fn(&Aggregate)) {
        f(&self.aggregate);
        let subs = self.submetrics.read();
        for sub in subs.iter().filter(|s| s.selector.matches(tags)) {
            f(&sub.aggregate);
        }
    }
}

#[derive(Default)]
struct CheckCounter {
    passes: AtomicU64,
    fails: AtomicU64,
}

/// Registry of every metric written during a run.
pub struct MetricRegistry {
    metrics: DashMap<String, Metric>,
    checks: DashMap<(String, String), CheckCounter>,
    created: Instant,
}

impl MetricRegistry {
    /// Creates an empty registry with no metrics declared.
    pub fn new() -> Self {
        Self {
            metrics: DashMap::new(),
            checks: DashMap::new(),
            created: Instant::now(),
        }
    }

    /// Creates a registry with all built-in metrics declared.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for (name, kind) in BUILTIN_METRICS {
            registry.metrics.insert((*name).to_string(), Metric::new(*kind));
        }
        registry
    }

    /// Returns the kind of a built-in metric name.
    pub fn builtin_kind(name: &str) -> Option<MetricKind> {
        BUILTIN_METRICS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, kind)| *kind)
    }

    /// Registers a metric.
    ///
    /// Declaring an existing name again with the same kind is a no-op; with a
    /// different kind it fails with [`RegistryError::DuplicateMetric`].
    pub fn declare(&self, name: &str, kind: MetricKind) -> Result<(), RegistryError> {
        match self.metrics.entry(name.to_string()) {
            Entry::Occupied(existing) if existing.get().kind != kind => {
                Err(RegistryError::DuplicateMetric {
                    name: name.to_string(),
                    existing: existing.get().kind,
                    requested: kind,
                })
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                tracing::debug!(metric = name, %kind, "declared metric");
                slot.insert(Metric::new(kind));
                Ok(())
            }
        }
    }

    /// Registers a tag-selected sub-metric of an already declared metric.
    ///
    /// Plain keys (no selector) only check that the metric exists.
    pub fn declare_submetric(&self, key: &MetricKey) -> Result<MetricKind, RegistryError> {
        let metric = self
            .metrics
            .get(&key.name)
            .ok_or_else(|| RegistryError::UnknownMetric {
                name: key.name.clone(),
            })?;
        let Some(selector) = &key.selector else {
            return Ok(metric.kind);
        };

        let mut subs = metric.submetrics.write();
        if !subs.iter().any(|s| &s.selector == selector) {
            subs.push(SubMetric {
                key: key.to_string(),
                selector: selector.clone(),
                aggregate: Aggregate::new(metric.kind),
            });
        }
        Ok(metric.kind)
    }

    /// Returns the kind of a declared metric.
    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.metrics.get(name).map(|m| m.kind)
    }

    /// Records one sample into a metric and every matching sub-metric.
    ///
    /// Writing to an undeclared metric is logged and returns
    /// [`RegistryError::UnknownMetric`]; nothing is recorded.
    pub fn record(&self, name: &str, value: f64, tags: &TagSet) -> Result<(), RegistryError> {
        self.write(name, tags, |agg| agg.record(value))
    }

    /// Moves a gauge by `delta` (for example `+1` / `-1` around an
    /// iteration). On other kinds this is the same as [`Self::record`].
    pub fn adjust(&self, name: &str, delta: f64, tags: &TagSet) -> Result<(), RegistryError> {
        self.write(name, tags, |agg| agg.adjust(delta))
    }

    /// Fire-and-forget [`Self::record`] for the hot path. An undeclared
    /// metric is already logged by the registry, so the error is dropped.
    pub fn emit(&self, name: &str, value: f64, tags: &TagSet) {
        let _ = self.record(name, value, tags);
    }

    /// Fire-and-forget [`Self::adjust`]; see [`Self::emit`].
    pub fn emit_delta(&self, name: &str, delta: f64, tags: &TagSet) {
        let _ = self.adjust(name, delta, tags);
    }

    fn write(
        &self,
        name: &str,
        tags: &TagSet,
        f: impl Fn(&Aggregate),
    ) -> Result<(), RegistryError> {
        let Some(metric) = self.metrics.get(name) else {
            tracing::warn!(metric = name, "sample for undeclared metric dropped");
            return Err(RegistryError::UnknownMetric {
                name: name.to_string(),
            });
        };
        metric.write(tags, f);
        Ok(())
    }

    /// Records one check result: into the built-in `checks` rate (tagged
    /// with `check` and `group`) and into the per-check tally.
    pub fn record_check(&self, group: &str, check: &str, passed: bool, tags: &TagSet) {
        let tags = tags.clone().with("check", check).with("group", group);
        // `checks` is built in; a bare registry without it still tallies.
        self.emit(builtin::CHECKS, if passed { 1.0 } else { 0.0 }, &tags);

        let counter = self
            .checks
            .entry((group.to_string(), check.to_string()))
            .or_default();
        if passed {
            counter.passes.fetch_add(1, Ordering::Relaxed);
        } else {
            counter.fails.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot using the time since the registry was created.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.snapshot_at(self.created.elapsed())
    }

    /// Snapshot with an explicit run elapsed time (used for counter rates).
    ///
    /// Safe to call while writers are active.
    pub fn snapshot_at(&self, elapsed: Duration) -> RegistrySnapshot {
        let mut metrics = BTreeMap::new();
        for entry in self.metrics.iter() {
            let metric = entry.value();
            metrics.insert(entry.key().clone(), metric.aggregate.snapshot(elapsed));
            for sub in metric.submetrics.read().iter() {
                metrics.insert(sub.key.clone(), sub.aggregate.snapshot(elapsed));
            }
        }

        let mut checks: Vec<CheckTally> = self
            .checks
            .iter()
            .map(|entry| {
                let (group, name) = entry.key();
                CheckTally {
                    group: group.clone(),
                    name: name.clone(),
                    passes: entry.value().passes.load(Ordering::Relaxed),
                    fails: entry.value().fails.load(Ordering::Relaxed),
                }
            })
            .collect();
        checks.sort_by(|a, b| (&a.group, &a.name).cmp(&(&b.group, &b.name)));

        RegistrySnapshot {
            elapsed,
            metrics,
            checks,
        }
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_builtins_are_declared() {
        let registry = MetricRegistry::with_builtins();
        assert_eq!(
            registry.kind_of(builtin::HTTP_REQ_DURATION),
            Some(MetricKind::Trend)
        );
        assert_eq!(registry.kind_of(builtin::HTTP_REQ_FAILED), Some(MetricKind::Rate));
        assert_eq!(registry.kind_of(builtin::ERRORS), Some(MetricKind::Rate));
        assert_eq!(registry.kind_of(builtin::VUS), Some(MetricKind::Gauge));
    }

    #[test]
    fn test_declare_same_kind_is_idempotent() {
        let registry = MetricRegistry::new();
        registry.declare("latency", MetricKind::Trend).unwrap();
        registry.declare("latency", MetricKind::Trend).unwrap();
        assert_eq!(registry.kind_of("latency"), Some(MetricKind::Trend));
    }

    #[test]
    fn test_declare_different_kind_fails() {
        let registry = MetricRegistry::with_builtins();
        let err = registry
            .declare(builtin::ERRORS, MetricKind::Counter)
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateMetric {
                name: "errors".to_string(),
                existing: MetricKind::Rate,
                requested: MetricKind::Counter,
            }
        );
    }

    #[test]
    fn test_record_unknown_metric_fails_without_side_effects() {
        let registry = MetricRegistry::new();
        let err = registry.record("nope", 1.0, &TagSet::new()).unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownMetric {
                name: "nope".to_string()
            }
        );
        assert!(registry.snapshot().metrics.is_empty());
    }

    #[test]
    fn test_emit_skips_undeclared_and_records_declared() {
        let registry = MetricRegistry::with_builtins();
        let tags = TagSet::new();
        registry.emit("nope", 1.0, &tags);
        registry.emit_delta("nope", 1.0, &tags);
        assert!(registry.kind_of("nope").is_none());

        registry.emit(builtin::VUS, 3.0, &tags);
        registry.emit_delta(builtin::VUS, 2.0, &tags);
        let snap = registry.snapshot();
        let vus = snap.gauge(builtin::VUS).unwrap();
        assert_eq!(vus.value, Some(5.0));
        assert_eq!(vus.max, Some(5.0));
    }

    #[test]
    fn test_rate_reports_exact_fraction() {
        let registry = MetricRegistry::with_builtins();
        let tags = TagSet::new();
        for _ in 0..7 {
            registry.record(builtin::ERRORS, 1.0, &tags).unwrap();
        }
        for _ in 0..13 {
            registry.record(builtin::ERRORS, 0.0, &tags).unwrap();
        }
        let snap = registry.snapshot();
        assert_eq!(snap.rate(builtin::ERRORS).unwrap().rate(), Some(7.0 / 20.0));
    }

    #[test]
    fn test_trend_percentiles_of_one_to_hundred() {
        let registry = MetricRegistry::new();
        registry.declare("t", MetricKind::Trend).unwrap();
        for v in 1..=100 {
            registry.record("t", v as f64, &TagSet::new()).unwrap();
        }
        let snap = registry.snapshot();
        let trend = snap.trend("t").unwrap();
        let p95 = trend.percentile(95.0).unwrap();
        let p99 = trend.percentile(99.0).unwrap();
        assert!((p95 - 95.0).abs() <= 0.95, "p95 should be within 1% of 95, got {p95}");
        assert!((p99 - 99.0).abs() <= 0.99, "p99 should be within 1% of 99, got {p99}");
        assert_eq!(trend.min, Some(1.0));
        assert_eq!(trend.max, Some(100.0));
        assert_eq!(trend.avg(), Some(50.5));
    }

    #[test]
    fn test_submetric_receives_only_matching_samples() {
        let registry = MetricRegistry::with_builtins();
        let key = MetricKey::parse("http_req_duration{group:Users}").unwrap();
        registry.declare_submetric(&key).unwrap();

        let users = TagSet::new().with("group", "Users");
        let projects = TagSet::new().with("group", "Projects");
        registry
            .record(builtin::HTTP_REQ_DURATION, 100.0, &users)
            .unwrap();
        registry
            .record(builtin::HTTP_REQ_DURATION, 900.0, &projects)
            .unwrap();

        let snap = registry.snapshot();
        assert_eq!(snap.trend("http_req_duration").unwrap().count, 2);
        let sub = snap.trend("http_req_duration{group:Users}").unwrap();
        assert_eq!(sub.count, 1);
        assert_eq!(sub.max, Some(100.0));
    }

    #[test]
    fn test_submetric_of_unknown_parent_fails() {
        let registry = MetricRegistry::new();
        let key = MetricKey::parse("custom{group:a}").unwrap();
        assert!(matches!(
            registry.declare_submetric(&key),
            Err(RegistryError::UnknownMetric { .. })
        ));
    }

    #[test]
    fn test_record_check_tallies_and_feeds_checks_rate() {
        let registry = MetricRegistry::with_builtins();
        registry.record_check("Users", "status is 200", true, &TagSet::new());
        registry.record_check("Users", "status is 200", false, &TagSet::new());
        registry.record_check("", "has body", true, &TagSet::new());

        let snap = registry.snapshot();
        assert_eq!(
            snap.checks,
            vec![
                CheckTally {
                    group: String::new(),
                    name: "has body".to_string(),
                    passes: 1,
                    fails: 0,
                },
                CheckTally {
                    group: "Users".to_string(),
                    name: "status is 200".to_string(),
                    passes: 1,
                    fails: 1,
                },
            ]
        );
        let checks = snap.rate(builtin::CHECKS).unwrap();
        assert_eq!((checks.passes, checks.total), (2, 3));
    }

    #[test]
    fn test_snapshot_during_concurrent_writes() {
        let registry = Arc::new(MetricRegistry::with_builtins());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let tags = TagSet::new();
                    for i in 0..2_000 {
                        registry
                            .record(builtin::HTTP_REQ_DURATION, (i % 100) as f64, &tags)
                            .unwrap();
                        registry.record(builtin::HTTP_REQS, 1.0, &tags).unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            let snap = registry.snapshot();
            let trend = snap.trend(builtin::HTTP_REQ_DURATION).unwrap();
            if let (Some(min), Some(max)) = (trend.min, trend.max) {
                assert!(min <= max);
                assert!(trend.percentile(50.0).unwrap() <= max);
            }
        }
        for w in writers {
            w.join().unwrap();
        }

        let snap = registry.snapshot();
        assert_eq!(snap.trend(builtin::HTTP_REQ_DURATION).unwrap().count, 8_000);
        assert_eq!(snap.counter(builtin::HTTP_REQS).unwrap().count, 8_000.0);
    }
}
