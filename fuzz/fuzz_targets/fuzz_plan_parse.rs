//! Fuzz target for plan parsing.
//!
//! Feeds arbitrary UTF-8 to `TestPlan::from_toml()` and `TestPlan::from_json()`.
//! Parse and validation errors are fine, panics are not.
//!
//! Run with: `cargo +nightly fuzz run fuzz_plan_parse`

#![no_main]
use libfuzzer_sys::fuzz_target;

use stampede::plan::TestPlan;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = TestPlan::from_toml(s);
        let _ = TestPlan::from_json(s);
    }
});
