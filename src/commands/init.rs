//! `stampede init` command implementation.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;

/// Execute the `init` command.
///
/// Writes a commented starter plan to `path`. Refuses to overwrite an
/// existing file unless `force` is set.
pub fn execute_init(path: &Path, force: bool) -> Result<ExitCode> {
    if path.exists() && !force {
        anyhow::bail!(
            "Plan file already exists: {}\n\
             Use `--force` to overwrite.",
            path.display()
        );
    }

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, generate_default_template())?;
    eprintln!("Created {}", path.display());
    eprintln!("Edit base_url and the requests, then run `stampede run {}`.", path.display());

    Ok(ExitCode::SUCCESS)
}

/// Starter plan: a short ramp, one group with checks, a pause, and the
/// thresholds most runs want.
fn generate_default_template() -> String {
    r#"# Stampede load test plan
#
# Run with: stampede run stampede.toml
# Durations accept "500ms", "30s", "1m30s", "2h".

base_url = "http://localhost:8080"

[settings]
timeout = "30s"
graceful_stop = "30s"

[headers]
Accept = "application/json"

[variables]
user_id = "1"

# Ramp to 10 VUs, hold, ramp down.
[[stages]]
duration = "30s"
target = 10

[[stages]]
duration = "1m"
target = 10

[[stages]]
duration = "30s"
target = 0

[thresholds]
http_req_duration = ["p(95)<1000", "p(99)<2000"]
errors = ["rate<0.1"]

[metrics]
users_response_time = "trend"

[[iteration.steps]]
type = "group"
name = "Users API"
trend = "users_response_time"
  [[iteration.steps.requests]]
  name = "get user"
  url = "/users/${user_id}"
  checks = [
    { name = "status is 200 or 304", type = "status", in = [200, 304] },
    { type = "duration_below", ms = 1000 },
  ]

[[iteration.steps]]
type = "pause"
duration = "1s"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede::plan::TestPlan;

    #[test]
    fn test_template_is_a_valid_plan() {
        let plan = TestPlan::from_toml(&generate_default_template()).unwrap();
        plan.validate().unwrap();
        assert_eq!(plan.stages.len(), 3);
        assert_eq!(plan.max_vus(), 10);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.toml");
        std::fs::write(&path, "existing").unwrap();

        assert!(execute_init(&path, false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing");

        execute_init(&path, true).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("[[stages]]"));
    }

    #[test]
    fn test_init_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("load").join("plan.toml");
        execute_init(&path, false).unwrap();
        assert!(path.exists());
    }
}
