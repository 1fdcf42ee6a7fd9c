//! Immutable point-in-time views of the registry.

use std::collections::BTreeMap;
use std::time::Duration;

use hdrhistogram::Histogram;

use super::aggregate::TREND_SCALE;
use super::MetricKind;

/// Sum of a counter and its per-second rate over the run so far.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CounterSnapshot {
    pub count: f64,
    pub rate: f64,
}

/// Last value of a gauge plus the extremes it has taken.
///
/// All fields are `None` when the gauge was never written.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GaugeSnapshot {
    pub value: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// True observations over all observations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateSnapshot {
    pub passes: u64,
    pub total: u64,
}

impl RateSnapshot {
    /// `passes / total`, or `None` before the first observation.
    pub fn rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.passes as f64 / self.total as f64)
    }

    pub fn fails(&self) -> u64 {
        self.total - self.passes
    }
}

/// Distribution summary of a trend.
///
/// `min`, `max`, `sum` and the average are exact; percentiles come from a
/// merged HdrHistogram with three significant figures.
#[derive(Debug, Clone)]
pub struct TrendSnapshot {
    pub count: u64,
    pub sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    histogram: Histogram<u64>,
}

impl TrendSnapshot {
    pub(crate) fn new(histogram: Histogram<u64>, count: u64, sum: f64, min: f64, max: f64) -> Self {
        let (min, max) = if count > 0 {
            (Some(min), Some(max))
        } else {
            (None, None)
        };
        Self {
            count,
            sum,
            min,
            max,
            histogram,
        }
    }

    pub fn avg(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn med(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    /// Value at percentile `p` (0..=100), clamped to the exact observed range.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        let (min, max) = (self.min?, self.max?);
        let raw = self.histogram.value_at_quantile(p / 100.0) as f64 / TREND_SCALE;
        Some(raw.clamp(min, max))
    }
}

/// Aggregate state of one metric at snapshot time.
#[derive(Debug, Clone)]
pub enum AggregateSnapshot {
    Counter(CounterSnapshot),
    Gauge(GaugeSnapshot),
    Rate(RateSnapshot),
    Trend(TrendSnapshot),
}

impl AggregateSnapshot {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Rate(_) => MetricKind::Rate,
            Self::Trend(_) => MetricKind::Trend,
        }
    }

    /// Returns `false` for aggregates that have not observed anything yet.
    ///
    /// Counters always have data: zero is a meaningful count.
    pub fn has_data(&self) -> bool {
        match self {
            Self::Counter(_) => true,
            Self::Gauge(g) => g.value.is_some(),
            Self::Rate(r) => r.total > 0,
            Self::Trend(t) => t.count > 0,
        }
    }
}

/// Pass/fail tally for one named check within one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTally {
    pub group: String,
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

/// Point-in-time view of every metric in a registry.
///
/// Each metric is internally consistent; different metrics may have been
/// read at slightly different instants.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    /// Run time the snapshot was taken at, used for counter rates.
    pub elapsed: Duration,
    /// Metrics and sub-metrics keyed by `name` or `name{tag:value}`.
    pub metrics: BTreeMap<String, AggregateSnapshot>,
    /// Check tallies sorted by group, then check name.
    pub checks: Vec<CheckTally>,
}

impl RegistrySnapshot {
    pub fn get(&self, key: &str) -> Option<&AggregateSnapshot> {
        self.metrics.get(key)
    }

    pub fn trend(&self, key: &str) -> Option<&TrendSnapshot> {
        match self.metrics.get(key) {
            Some(AggregateSnapshot::Trend(t)) => Some(t),
            _ => None,
        }
    }

    pub fn rate(&self, key: &str) -> Option<&RateSnapshot> {
        match self.metrics.get(key) {
            Some(AggregateSnapshot::Rate(r)) => Some(r),
            _ => None,
        }
    }

    pub fn counter(&self, key: &str) -> Option<&CounterSnapshot> {
        match self.metrics.get(key) {
            Some(AggregateSnapshot::Counter(c)) => Some(c),
            _ => None,
        }
    }

    pub fn gauge(&self, key: &str) -> Option<&GaugeSnapshot> {
        match self.metrics.get(key) {
            Some(AggregateSnapshot::Gauge(g)) => Some(g),
            _ => None,
        }
    }
}
