//! Integration tests for plan loading: the shipped demo plans, JSON plans,
//! and the registry and thresholds a loaded plan produces.

use std::path::{Path, PathBuf};
use std::time::Duration;

use stampede::engine::dry_run;
use stampede::metrics::MetricKind;
use stampede::plan::{Step, TestPlan};

fn demos_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos")
}

fn load_demo(name: &str) -> TestPlan {
    TestPlan::load(&demos_dir().join(name)).unwrap()
}

#[test]
fn every_demo_plan_is_valid() {
    let mut seen = 0;
    for entry in std::fs::read_dir(demos_dir()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            let plan = TestPlan::load(&path)
                .unwrap_or_else(|e| panic!("{} failed to load: {e}", path.display()));
            dry_run(&plan).unwrap_or_else(|e| panic!("{} failed dry run: {e}", path.display()));
            seen += 1;
        }
    }
    assert!(seen >= 3, "expected the demo plans, found {seen}");
}

#[test]
fn dashboard_demo_shape() {
    let plan = load_demo("dashboard.toml");
    assert_eq!(plan.stages.len(), 5);
    assert_eq!(plan.total_duration(), Duration::from_secs(6 * 60));
    assert_eq!(plan.max_vus(), 100);
    assert_eq!(plan.stages.last().map(|s| s.target), Some(0));
    assert_eq!(plan.metrics["active_connections"], MetricKind::Gauge);

    let kinds: Vec<_> = plan.iteration.steps.iter().map(Step::kind_name).collect();
    assert_eq!(kinds, ["group", "pause", "group", "pause"]);

    let registry = plan.build_registry().unwrap();
    let thresholds = plan.threshold_expressions(&registry).unwrap();
    assert_eq!(thresholds.len(), 5);
}

#[test]
fn batch_demo_has_concurrent_requests() {
    let plan = load_demo("batch.toml");
    let Step::Batch(group) = &plan.iteration.steps[0] else {
        panic!("first step should be a batch");
    };
    assert_eq!(group.requests.len(), 3);
    assert!(group.requests.iter().all(|r| r.checks.len() == 2));
}

#[test]
fn rate_approval_demo_uses_random_step_and_builtin_variables() {
    let plan = load_demo("rate-approval.toml");
    let random = plan
        .iteration
        .steps
        .iter()
        .find_map(|s| match s {
            Step::Random(group) => Some(group),
            _ => None,
        })
        .unwrap();
    let weights: Vec<_> = random.requests.iter().map(|r| r.weight).collect();
    assert_eq!(weights, [3, 1]);
    assert_eq!(plan.settings.tick.as_duration(), Duration::from_millis(250));
    assert_eq!(plan.trend_stats().unwrap().len(), 7);
}

#[test]
fn json_plan_loads_like_toml() {
    let json = r#"{
        "base_url": "http://localhost:8080",
        "stages": [
            { "duration": "10s", "target": 5 },
            { "duration": 0, "target": 0 }
        ],
        "thresholds": { "http_req_failed": ["rate<0.01"] },
        "iteration": {
            "steps": [
                {
                    "type": "group",
                    "name": "health",
                    "requests": [
                        {
                            "url": "/health",
                            "checks": [{ "type": "status", "in": [200] }]
                        }
                    ]
                },
                { "type": "pause", "duration": "250ms" }
            ]
        }
    }"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan.json");
    std::fs::write(&path, json).unwrap();

    let plan = TestPlan::load(&path).unwrap();
    assert_eq!(plan.stages.len(), 2);
    assert_eq!(plan.total_duration(), Duration::from_secs(10));
    assert_eq!(plan.iteration.steps.len(), 2);
}

#[test]
fn invalid_plan_fails_as_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(
        &path,
        r#"
base_url = "http://localhost:8080"

[[stages]]
duration = "10s"
target = 1

[thresholds]
http_req_duration = ["p(95)<<1000"]

[[iteration.steps]]
type = "group"
  [[iteration.steps.requests]]
  url = "/"
"#,
    )
    .unwrap();

    let err = TestPlan::load(&path).unwrap_err();
    assert!(err.is_configuration(), "unexpected error: {err}");
}
