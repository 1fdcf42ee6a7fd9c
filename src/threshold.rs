//! Threshold expressions and their evaluation.
//!
//! A threshold is `<aggregation> <comparator> <bound>` attached to a metric
//! key, e.g. `p(95)<1000` on `http_req_duration` or `rate<0.1` on
//! `errors{group:Users}`. Expressions are parsed once during plan
//! validation and then evaluated read-only against registry snapshots.
//!
//! Enforcement is soft: [`ThresholdEvaluator::observe`] runs on every
//! scheduler tick and only logs breach transitions. The run verdict comes
//! from [`ThresholdEvaluator::verdict`] on the final snapshot.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::ThresholdParseError;
use crate::metrics::{AggregateSnapshot, MetricKey, MetricKind, RegistrySnapshot};

static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:\(\s*([^)]*?)\s*\))?\s*(<=|>=|===|==|!=|<|>)\s*(\S+)\s*$")
        .expect("threshold regex is valid")
});

/// Aggregation applied to a metric before comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    /// `p(N)` with `N` in `(0, 100]`.
    Percentile(f64),
    Count,
    Rate,
    Value,
}

impl Aggregation {
    fn parse(name: &str, arg: Option<&str>) -> Result<Self, ThresholdParseError> {
        let agg = match (name, arg) {
            ("p", Some(arg)) => {
                let p: f64 = arg
                    .parse()
                    .map_err(|_| ThresholdParseError::PercentileRange(arg.to_string()))?;
                if !(p > 0.0 && p <= 100.0) {
                    return Err(ThresholdParseError::PercentileRange(arg.to_string()));
                }
                Self::Percentile(p)
            }
            ("avg", None) => Self::Avg,
            ("min", None) => Self::Min,
            ("max", None) => Self::Max,
            ("med", None) => Self::Med,
            ("count", None) => Self::Count,
            ("rate", None) => Self::Rate,
            ("value", None) => Self::Value,
            (name, Some(arg)) => {
                return Err(ThresholdParseError::UnknownAggregation(format!("{name}({arg})")))
            }
            (name, None) => return Err(ThresholdParseError::UnknownAggregation(name.to_string())),
        };
        Ok(agg)
    }

    /// Returns `true` if this aggregation is defined for metrics of `kind`.
    pub fn applies_to(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Trend => matches!(
                self,
                Self::Avg | Self::Min | Self::Max | Self::Med | Self::Percentile(_) | Self::Count
            ),
            MetricKind::Rate => matches!(self, Self::Rate),
            MetricKind::Counter => matches!(self, Self::Count | Self::Rate),
            MetricKind::Gauge => matches!(self, Self::Value | Self::Min | Self::Max),
        }
    }

    /// Computes the aggregation, or `None` when the metric has no data yet
    /// or the aggregation does not apply to it.
    pub fn measure(&self, aggregate: &AggregateSnapshot) -> Option<f64> {
        if !aggregate.has_data() {
            return None;
        }
        match (self, aggregate) {
            (Self::Avg, AggregateSnapshot::Trend(t)) => t.avg(),
            (Self::Min, AggregateSnapshot::Trend(t)) => t.min,
            (Self::Max, AggregateSnapshot::Trend(t)) => t.max,
            (Self::Med, AggregateSnapshot::Trend(t)) => t.med(),
            (Self::Percentile(p), AggregateSnapshot::Trend(t)) => t.percentile(*p),
            (Self::Count, AggregateSnapshot::Trend(t)) => Some(t.count as f64),
            (Self::Rate, AggregateSnapshot::Rate(r)) => r.rate(),
            (Self::Count, AggregateSnapshot::Counter(c)) => Some(c.count),
            (Self::Rate, AggregateSnapshot::Counter(c)) => Some(c.rate),
            (Self::Value, AggregateSnapshot::Gauge(g)) => g.value,
            (Self::Min, AggregateSnapshot::Gauge(g)) => g.min,
            (Self::Max, AggregateSnapshot::Gauge(g)) => g.max,
            _ => None,
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Percentile(p) => write!(f, "p({p})"),
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::Value => f.write_str("value"),
        }
    }
}

impl std::str::FromStr for Aggregation {
    type Err = ThresholdParseError;

    /// Parses the bare aggregation form used by `summary_trend_stats`
    /// (`avg`, `p(90)`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('(') {
            Some((name, rest)) => {
                let arg = rest
                    .strip_suffix(')')
                    .ok_or_else(|| ThresholdParseError::UnknownAggregation(s.to_string()))?;
                Self::parse(name.trim(), Some(arg.trim()))
            }
            None => Self::parse(s, None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparator {
    fn parse(op: &str) -> Self {
        match op {
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "!=" => Self::Ne,
            _ => Self::Eq,
        }
    }

    pub fn holds(&self, measured: f64, bound: f64) -> bool {
        match self {
            Self::Lt => measured < bound,
            Self::Le => measured <= bound,
            Self::Gt => measured > bound,
            Self::Ge => measured >= bound,
            Self::Eq => measured == bound,
            Self::Ne => measured != bound,
        }
    }
}

/// One parsed threshold: metric key, aggregation, comparator and bound.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpression {
    pub metric: MetricKey,
    pub aggregation: Aggregation,
    pub comparator: Comparator,
    pub bound: f64,
    /// The expression as written in the plan.
    pub source: String,
}

impl ThresholdExpression {
    /// Parses `expression` for the given metric key.
    pub fn parse(metric: MetricKey, expression: &str) -> Result<Self, ThresholdParseError> {
        let caps = EXPRESSION
            .captures(expression)
            .ok_or(ThresholdParseError::Syntax)?;
        let name = &caps[1];
        let arg = caps.get(2).map(|m| m.as_str());
        let aggregation = Aggregation::parse(name, arg)?;
        let comparator = Comparator::parse(&caps[3]);
        let bound: f64 = caps[4]
            .parse()
            .ok()
            .filter(|b: &f64| b.is_finite())
            .ok_or_else(|| ThresholdParseError::Bound(caps[4].to_string()))?;

        Ok(Self {
            metric,
            aggregation,
            comparator,
            bound,
            source: expression.trim().to_string(),
        })
    }

    /// Fails if the aggregation is not defined for `kind`.
    pub fn check_kind(&self, kind: MetricKind) -> Result<(), ThresholdParseError> {
        if self.aggregation.applies_to(kind) {
            Ok(())
        } else {
            Err(ThresholdParseError::KindMismatch {
                aggregation: self.aggregation.to_string(),
                kind,
            })
        }
    }

    /// Evaluates against a snapshot. A metric without data passes with no
    /// measured value.
    pub fn evaluate(&self, snapshot: &RegistrySnapshot) -> ThresholdResult {
        let key = self.metric.to_string();
        let measured = snapshot
            .get(&key)
            .and_then(|agg| self.aggregation.measure(agg));
        let passed = measured.is_none_or(|m| self.comparator.holds(m, self.bound));
        ThresholdResult {
            metric: key,
            expression: self.source.clone(),
            measured,
            passed,
        }
    }
}

/// Outcome of evaluating one threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub measured: Option<f64>,
    pub passed: bool,
}

/// Final verdict over all thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub results: Vec<ThresholdResult>,
    pub passed: bool,
}

/// Evaluates a fixed set of thresholds repeatedly.
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    thresholds: Vec<ThresholdExpression>,
    failing: Vec<bool>,
}

impl ThresholdEvaluator {
    pub fn new(thresholds: Vec<ThresholdExpression>) -> Self {
        let failing = vec![false; thresholds.len()];
        Self {
            thresholds,
            failing,
        }
    }

    pub fn thresholds(&self) -> &[ThresholdExpression] {
        &self.thresholds
    }

    /// Mid-run evaluation: records which thresholds currently fail and logs
    /// transitions. Never stops the run. Returns the number failing.
    pub fn observe(&mut self, snapshot: &RegistrySnapshot) -> usize {
        for (threshold, failing) in self.thresholds.iter().zip(self.failing.iter_mut()) {
            let result = threshold.evaluate(snapshot);
            if !result.passed && !*failing {
                tracing::warn!(
                    metric = %result.metric,
                    expression = %result.expression,
                    measured = ?result.measured,
                    "threshold currently breached"
                );
            } else if result.passed && *failing {
                tracing::info!(
                    metric = %result.metric,
                    expression = %result.expression,
                    "threshold recovered"
                );
            }
            *failing = !result.passed;
        }
        self.failing.iter().filter(|f| **f).count()
    }

    /// Final evaluation. The run passes only if every threshold passes.
    pub fn verdict(&self, snapshot: &RegistrySnapshot) -> Verdict {
        let results: Vec<_> = self
            .thresholds
            .iter()
            .map(|t| t.evaluate(snapshot))
            .collect();
        let passed = results.iter().all(|r| r.passed);
        Verdict { results, passed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{builtin, MetricRegistry, TagSet};

    fn expr(metric: &str, expression: &str) -> ThresholdExpression {
        ThresholdExpression::parse(MetricKey::parse(metric).unwrap(), expression).unwrap()
    }

    #[test]
    fn test_parse_percentile_expression() {
        let t = expr("http_req_duration", "p(95)<1000");
        assert_eq!(t.aggregation, Aggregation::Percentile(95.0));
        assert_eq!(t.comparator, Comparator::Lt);
        assert_eq!(t.bound, 1000.0);
    }

    #[test]
    fn test_parse_spaces_and_fractional_percentile() {
        let t = expr("http_req_duration", "  p( 99.9 ) <= 1.5e3 ");
        assert_eq!(t.aggregation, Aggregation::Percentile(99.9));
        assert_eq!(t.comparator, Comparator::Le);
        assert_eq!(t.bound, 1500.0);
        assert_eq!(t.source, "p( 99.9 ) <= 1.5e3");
    }

    #[test]
    fn test_parse_all_comparators() {
        for (op, cmp) in [
            ("<", Comparator::Lt),
            ("<=", Comparator::Le),
            (">", Comparator::Gt),
            (">=", Comparator::Ge),
            ("==", Comparator::Eq),
            ("===", Comparator::Eq),
            ("!=", Comparator::Ne),
        ] {
            assert_eq!(expr("errors", &format!("rate{op}0.1")).comparator, cmp, "op {op}");
        }
    }

    #[test]
    fn test_parse_errors() {
        let key = || MetricKey::parse("m").unwrap();
        assert_eq!(
            ThresholdExpression::parse(key(), "p95<1"),
            Err(ThresholdParseError::UnknownAggregation("p95".to_string()))
        );
        assert_eq!(
            ThresholdExpression::parse(key(), "p(0)<1"),
            Err(ThresholdParseError::PercentileRange("0".to_string()))
        );
        assert_eq!(
            ThresholdExpression::parse(key(), "p(101)<1"),
            Err(ThresholdParseError::PercentileRange("101".to_string()))
        );
        assert_eq!(
            ThresholdExpression::parse(key(), "avg<abc"),
            Err(ThresholdParseError::Bound("abc".to_string()))
        );
        assert_eq!(ThresholdExpression::parse(key(), "avg 100"), Err(ThresholdParseError::Syntax));
        assert_eq!(
            ThresholdExpression::parse(key(), "avg(3)<1"),
            Err(ThresholdParseError::UnknownAggregation("avg(3)".to_string()))
        );
    }

    #[test]
    fn test_kind_applicability() {
        assert!(expr("m", "p(95)<1").check_kind(MetricKind::Trend).is_ok());
        assert!(expr("m", "rate<0.1").check_kind(MetricKind::Rate).is_ok());
        assert!(expr("m", "count>10").check_kind(MetricKind::Counter).is_ok());
        assert!(expr("m", "value<5").check_kind(MetricKind::Gauge).is_ok());
        assert_eq!(
            expr("m", "p(95)<1").check_kind(MetricKind::Rate),
            Err(ThresholdParseError::KindMismatch {
                aggregation: "p(95)".to_string(),
                kind: MetricKind::Rate,
            })
        );
    }

    #[test]
    fn test_aggregation_from_str() {
        assert_eq!("avg".parse::<Aggregation>(), Ok(Aggregation::Avg));
        assert_eq!("p(90)".parse::<Aggregation>(), Ok(Aggregation::Percentile(90.0)));
        assert!("p(90".parse::<Aggregation>().is_err());
    }

    fn registry_with(p95_target: f64, error_rate: f64) -> MetricRegistry {
        let registry = MetricRegistry::with_builtins();
        let tags = TagSet::new();
        // 100 samples: 95 at ~p95_target, 5 slightly above.
        for _ in 0..95 {
            registry
                .record(builtin::HTTP_REQ_DURATION, p95_target, &tags)
                .unwrap();
        }
        for _ in 0..5 {
            registry
                .record(builtin::HTTP_REQ_DURATION, p95_target + 50.0, &tags)
                .unwrap();
        }
        let errors = (error_rate * 100.0).round() as usize;
        for i in 0..100 {
            let v = if i < errors { 1.0 } else { 0.0 };
            registry.record(builtin::ERRORS, v, &tags).unwrap();
        }
        registry
    }

    #[test]
    fn test_verdict_flips_on_error_rate_only() {
        let evaluator = ThresholdEvaluator::new(vec![
            expr("http_req_duration", "p(95)<1000"),
            expr("errors", "rate<0.1"),
        ]);

        let ok = evaluator.verdict(&registry_with(900.0, 0.05).snapshot());
        assert!(ok.passed, "p95=900 and error rate 0.05 should pass: {ok:?}");

        let bad = evaluator.verdict(&registry_with(900.0, 0.2).snapshot());
        assert!(!bad.passed, "error rate 0.2 should fail");
        assert!(bad.results[0].passed, "latency threshold is unchanged");
        assert!(!bad.results[1].passed);
        assert_eq!(bad.results[1].measured, Some(0.2));
    }

    #[test]
    fn test_no_data_passes_without_measurement() {
        let registry = MetricRegistry::with_builtins();
        let evaluator = ThresholdEvaluator::new(vec![expr("http_req_duration", "p(95)<1")]);
        let verdict = evaluator.verdict(&registry.snapshot());
        assert!(verdict.passed);
        assert_eq!(verdict.results[0].measured, None);
    }

    #[test]
    fn test_observe_tracks_breaches_without_failing_the_run() {
        let registry = MetricRegistry::with_builtins();
        let mut evaluator = ThresholdEvaluator::new(vec![expr("errors", "rate<0.5")]);
        let tags = TagSet::new();

        registry.record(builtin::ERRORS, 1.0, &tags).unwrap();
        assert_eq!(evaluator.observe(&registry.snapshot()), 1);

        for _ in 0..3 {
            registry.record(builtin::ERRORS, 0.0, &tags).unwrap();
        }
        assert_eq!(evaluator.observe(&registry.snapshot()), 0);
        assert!(evaluator.verdict(&registry.snapshot()).passed);
    }

    #[test]
    fn test_counter_rate_uses_elapsed() {
        let registry = MetricRegistry::with_builtins();
        registry
            .record(builtin::HTTP_REQS, 50.0, &TagSet::new())
            .unwrap();
        let snap = registry.snapshot_at(std::time::Duration::from_secs(10));
        let result = expr("http_reqs", "rate>=5").evaluate(&snap);
        assert_eq!(result.measured, Some(5.0));
        assert!(result.passed);
    }
}
