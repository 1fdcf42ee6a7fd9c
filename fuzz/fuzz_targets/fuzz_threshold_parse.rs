//! Fuzz target for metric keys and threshold expressions.
//!
//! The first line is parsed as a metric key (`name{tag:value}`), the rest as
//! a threshold expression. Every accepted expression is evaluated against an
//! empty snapshot.
//!
//! Run with: `cargo +nightly fuzz run fuzz_threshold_parse`

#![no_main]
use libfuzzer_sys::fuzz_target;

use stampede::metrics::{MetricKey, MetricRegistry};
use stampede::threshold::{ThresholdEvaluator, ThresholdExpression};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let (key, expression) = s.split_once('\n').unwrap_or(("http_req_duration", s));
    let Ok(key) = MetricKey::parse(key) else {
        return;
    };
    let Ok(threshold) = ThresholdExpression::parse(key, expression) else {
        return;
    };

    let registry = MetricRegistry::with_builtins();
    let verdict = ThresholdEvaluator::new(vec![threshold]).verdict(&registry.snapshot());
    assert_eq!(verdict.results.len(), 1);
});
