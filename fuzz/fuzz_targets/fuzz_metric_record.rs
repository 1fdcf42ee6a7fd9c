//! Fuzz target for the metric registry.
//!
//! Decodes the input into a stream of samples for the built-in metrics and
//! checks that counters and rates account for every sample recorded.
//!
//! Run with: `cargo +nightly fuzz run fuzz_metric_record`

#![no_main]
use libfuzzer_sys::fuzz_target;

use stampede::metrics::{MetricRegistry, TagSet};

fuzz_target!(|data: &[u8]| {
    let registry = MetricRegistry::with_builtins();
    let mut requests = 0u64;
    let mut failures = 0u64;

    // Each sample is 5 bytes: a selector byte and an f32 value.
    for chunk in data.chunks_exact(5) {
        let value = f32::from_le_bytes([chunk[1], chunk[2], chunk[3], chunk[4]]);
        let value = if value.is_finite() { f64::from(value.abs()) } else { 0.0 };
        let tags = TagSet::new().with("status", (chunk[0] % 4).to_string());
        let failed = chunk[0] & 0x80 != 0;

        let _ = registry.record("http_req_duration", value, &tags);
        let _ = registry.record("http_reqs", 1.0, &tags);
        let _ = registry.record("http_req_failed", if failed { 1.0 } else { 0.0 }, &tags);
        requests += 1;
        failures += u64::from(failed);
    }

    let snapshot = registry.snapshot();
    if let Some(counter) = snapshot.counter("http_reqs") {
        assert_eq!(counter.count, requests as f64);
    }
    if let Some(rate) = snapshot.rate("http_req_failed") {
        assert_eq!(rate.passes, failures);
    }
});
