//! Per-metric accumulation cells.
//!
//! Counters are a single lock-free `f64` cell. Rates and trends are striped:
//! each metric owns a small array of mutex-protected cells and a writer picks
//! one by a per-thread hint, so concurrent writers on different worker
//! threads rarely touch the same lock. A snapshot locks each stripe in turn
//! and merges. Gauges need "last write wins" across all writers and keep a
//! single per-metric mutex.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;

use super::snapshot::{
    AggregateSnapshot, CounterSnapshot, GaugeSnapshot, RateSnapshot, TrendSnapshot,
};
use super::MetricKind;

/// Trend values are stored in the histogram multiplied by this factor, which
/// keeps three decimal places of a millisecond-valued sample.
pub(crate) const TREND_SCALE: f64 = 1000.0;

static NEXT_STRIPE_HINT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static STRIPE_HINT: usize = NEXT_STRIPE_HINT.fetch_add(1, Ordering::Relaxed);
}

/// Power of two between 4 and 64, scaled to the machine's parallelism.
static STRIPES: LazyLock<usize> = LazyLock::new(|| {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .next_power_of_two()
        .clamp(4, 64)
});

fn new_histogram() -> Histogram<u64> {
    let mut histogram = Histogram::<u64>::new(3).expect("3 sigfigs is always valid");
    histogram.auto(true);
    histogram
}

/// Mutex cells selected by a per-thread hint.
pub(crate) struct Striped<T> {
    cells: Box<[Mutex<T>]>,
}

impl<T> Striped<T> {
    fn new(init: impl Fn() -> T) -> Self {
        let cells = (0..*STRIPES).map(|_| Mutex::new(init())).collect();
        Self { cells }
    }

    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let idx = STRIPE_HINT.with(|hint| *hint) & (self.cells.len() - 1);
        f(&mut self.cells[idx].lock())
    }

    fn for_each(&self, mut f: impl FnMut(&T)) {
        for cell in self.cells.iter() {
            f(&cell.lock());
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct GaugeState {
    value: f64,
    min: f64,
    max: f64,
    written: bool,
}

impl GaugeState {
    fn set(&mut self, value: f64) {
        if self.written {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        } else {
            self.min = value;
            self.max = value;
            self.written = true;
        }
        self.value = value;
    }
}

#[derive(Debug, Default)]
pub(crate) struct RateState {
    trues: u64,
    total: u64,
}

pub(crate) struct TrendState {
    histogram: Histogram<u64>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl TrendState {
    fn new() -> Self {
        Self {
            histogram: new_histogram(),
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn record(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        // Negative samples keep exact min/avg but land in the zero bucket.
        let scaled = (value.max(0.0) * TREND_SCALE).round() as u64;
        if let Err(err) = self.histogram.record(scaled) {
            tracing::warn!(value, "trend sample outside histogram range: {err:?}");
        }
    }
}

/// The accumulation state behind one metric or sub-metric.
pub(crate) enum Aggregate {
    Counter(AtomicU64),
    Gauge(Mutex<GaugeState>),
    Rate(Striped<RateState>),
    Trend(Striped<TrendState>),
}

impl Aggregate {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(AtomicU64::new(0f64.to_bits())),
            MetricKind::Gauge => Self::Gauge(Mutex::new(GaugeState::default())),
            MetricKind::Rate => Self::Rate(Striped::new(RateState::default)),
            MetricKind::Trend => Self::Trend(Striped::new(TrendState::new)),
        }
    }

    /// Records one observation.
    ///
    /// Counter: adds `value`. Gauge: sets `value`. Rate: non-zero counts as
    /// `true`. Trend: adds `value` to the distribution.
    pub(crate) fn record(&self, value: f64) {
        match self {
            Self::Counter(bits) => add_f64(bits, value),
            Self::Gauge(state) => state.lock().set(value),
            Self::Rate(stripes) => stripes.with(|s| {
                s.total += 1;
                if value != 0.0 {
                    s.trues += 1;
                }
            }),
            Self::Trend(stripes) => stripes.with(|s| s.record(value)),
        }
    }

    /// Relative write: gauges move by `delta` from their last value (an
    /// unwritten gauge starts from zero); other kinds treat it as `record`.
    pub(crate) fn adjust(&self, delta: f64) {
        match self {
            Self::Gauge(state) => {
                let mut state = state.lock();
                let base = if state.written { state.value } else { 0.0 };
                state.set(base + delta);
            }
            other => other.record(delta),
        }
    }

    pub(crate) fn snapshot(&self, elapsed: Duration) -> AggregateSnapshot {
        match self {
            Self::Counter(bits) => {
                let count = f64::from_bits(bits.load(Ordering::Acquire));
                let secs = elapsed.as_secs_f64();
                AggregateSnapshot::Counter(CounterSnapshot {
                    count,
                    rate: if secs > 0.0 { count / secs } else { 0.0 },
                })
            }
            Self::Gauge(state) => {
                let state = state.lock();
                AggregateSnapshot::Gauge(if state.written {
                    GaugeSnapshot {
                        value: Some(state.value),
                        min: Some(state.min),
                        max: Some(state.max),
                    }
                } else {
                    GaugeSnapshot::default()
                })
            }
            Self::Rate(stripes) => {
                let mut merged = RateSnapshot::default();
                stripes.for_each(|s| {
                    merged.passes += s.trues;
                    merged.total += s.total;
                });
                AggregateSnapshot::Rate(merged)
            }
            Self::Trend(stripes) => {
                let mut histogram = new_histogram();
                let mut count = 0;
                let mut sum = 0.0;
                let mut min = f64::INFINITY;
                let mut max = f64::NEG_INFINITY;
                stripes.for_each(|s| {
                    if s.count == 0 {
                        return;
                    }
                    if let Err(err) = histogram.add(&s.histogram) {
                        tracing::warn!("failed to merge trend stripe: {err:?}");
                    }
                    count += s.count;
                    sum += s.sum;
                    min = min.min(s.min);
                    max = max.max(s.max);
                });
                AggregateSnapshot::Trend(TrendSnapshot::new(histogram, count, sum, min, max))
            }
        }
    }
}

fn add_f64(bits: &AtomicU64, value: f64) {
    let mut current = bits.load(Ordering::Relaxed);
    loop {
        let next = (f64::from_bits(current) + value).to_bits();
        match bits.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return,
            Err(actual) => current = actual,
        }
    }
}
