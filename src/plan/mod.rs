//! Test plan: stages, thresholds, custom metrics and iteration logic.
//!
//! A plan is a TOML (or JSON) document that is parsed and fully validated
//! before any virtual user starts. Validation covers everything that could
//! otherwise fail mid-run: threshold syntax, metric references, URL
//! templates, and check definitions.
//!
//! # Example TOML
//!
//! ```toml
//! base_url = "https://api.example.com/api/web"
//!
//! [headers]
//! Accept = "application/json"
//!
//! [[stages]]
//! duration = "30s"
//! target = 10
//!
//! [[stages]]
//! duration = "1m"
//! target = 0
//!
//! [thresholds]
//! http_req_duration = ["p(95)<1000"]
//! errors = ["rate<0.1"]
//!
//! [[iteration.steps]]
//! type = "group"
//! name = "Projects API"
//!   [[iteration.steps.requests]]
//!   url = "/projects"
//!   checks = [{ type = "status", in = [200, 304] }]
//! ```

mod duration;
mod iteration;
mod template;

pub use duration::PlanDuration;
pub use iteration::{IterationSpec, PauseSpec, RequestBody, RequestGroup, RequestSpec, Step};
pub use template::{resolve_url, UrlTemplate, Variables, ITER_VARIABLE, VU_VARIABLE};

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LoadTestError, TemplateError};
use crate::metrics::{builtin, MetricKey, MetricKind, MetricRegistry};
use crate::threshold::{Aggregation, ThresholdExpression};

/// Longest allowed scheduler tick.
const MAX_TICK: Duration = Duration::from_secs(1);

/// Longest schedule a plan may describe (sum of all stages).
const MAX_SCHEDULE: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// One segment of the load curve: ramp linearly to `target` VUs over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Stage {
    pub duration: PlanDuration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self {
            duration: duration.into(),
            target,
        }
    }
}

/// Run-wide settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Default per-request timeout.
    #[serde(default = "default_timeout")]
    pub timeout: PlanDuration,
    /// Scheduler and threshold evaluation tick (at most 1s).
    #[serde(default = "default_tick")]
    pub tick: PlanDuration,
    /// How long draining virtual users may keep running after the last stage.
    #[serde(default = "default_graceful_stop")]
    pub graceful_stop: PlanDuration,
    /// Virtual users at `t = 0`, the start point of the first ramp.
    #[serde(default)]
    pub start_vus: u32,
    /// Trend aggregations shown in the summary.
    #[serde(default = "default_trend_stats")]
    pub summary_trend_stats: Vec<String>,
}

fn default_timeout() -> PlanDuration {
    PlanDuration::from_secs(30)
}

fn default_tick() -> PlanDuration {
    PlanDuration::from_millis(500)
}

fn default_graceful_stop() -> PlanDuration {
    PlanDuration::from_secs(30)
}

fn default_trend_stats() -> Vec<String> {
    ["avg", "min", "med", "max", "p(90)", "p(95)"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            tick: default_tick(),
            graceful_stop: default_graceful_stop(),
            start_vus: 0,
            summary_trend_stats: default_trend_stats(),
        }
    }
}

/// A complete, immutable test plan.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TestPlan {
    /// Prefix for relative request URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub settings: Settings,
    /// Default headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Values for `${name}` placeholders.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Ramp stages, in order. At least one is required.
    #[serde(default, alias = "stage")]
    pub stages: Vec<Stage>,
    /// Threshold expressions keyed by `metric` or `metric{tag:value}`.
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
    /// Custom metric declarations.
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricKind>,
    pub iteration: IterationSpec,
}

impl TestPlan {
    /// Parse a TOML string into a validated [`TestPlan`].
    pub fn from_toml(content: &str) -> Result<Self, LoadTestError> {
        let plan: Self = toml::from_str(content)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Parse a JSON string into a validated [`TestPlan`].
    pub fn from_json(content: &str) -> Result<Self, LoadTestError> {
        let plan: Self = serde_json::from_str(content)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Load and validate a plan from a file; `.json` files are parsed as
    /// JSON, everything else as TOML.
    pub fn load(path: &Path) -> Result<Self, LoadTestError> {
        let plan = Self::read(path)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Parses a plan file without validating it, for callers that still
    /// adjust the plan (base URL, variables) before calling [`Self::validate`].
    pub fn read(path: &Path) -> Result<Self, LoadTestError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadTestError::PlanIo {
            source,
            path: path.display().to_string(),
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    /// Sum of all stage durations, saturating at `Duration::MAX`.
    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration.as_duration()))
    }

    /// Highest VU count the plan ever asks for.
    pub fn max_vus(&self) -> u32 {
        self.stages
            .iter()
            .map(|s| s.target)
            .chain(std::iter::once(self.settings.start_vus))
            .max()
            .unwrap_or(0)
    }

    /// Builds a registry with the built-ins, the plan's custom metrics, and
    /// one sub-metric per tag-selected threshold key.
    pub fn build_registry(&self) -> Result<MetricRegistry, LoadTestError> {
        let registry = MetricRegistry::with_builtins();
        for (name, kind) in &self.metrics {
            registry.declare(name, *kind)?;
        }
        for key in self.thresholds.keys() {
            let key = parse_metric_key(key)?;
            registry.declare_submetric(&key)?;
        }
        Ok(registry)
    }

    /// Parses every threshold and checks it against the metric kinds in `registry`.
    pub fn threshold_expressions(
        &self,
        registry: &MetricRegistry,
    ) -> Result<Vec<ThresholdExpression>, LoadTestError> {
        let mut out = Vec::new();
        for (raw_key, expressions) in &self.thresholds {
            let key = parse_metric_key(raw_key)?;
            let kind = registry.kind_of(&key.name).ok_or_else(|| {
                LoadTestError::validation(format!(
                    "threshold references undeclared metric '{}'",
                    key.name
                ))
            })?;
            for expression in expressions {
                let threshold_err = |source| LoadTestError::Threshold {
                    metric: raw_key.clone(),
                    expression: expression.clone(),
                    source,
                };
                let parsed =
                    ThresholdExpression::parse(key.clone(), expression).map_err(threshold_err)?;
                parsed.check_kind(kind).map_err(threshold_err)?;
                out.push(parsed);
            }
        }
        Ok(out)
    }

    /// Parsed `summary_trend_stats`.
    pub fn trend_stats(&self) -> Result<Vec<Aggregation>, LoadTestError> {
        self.settings
            .summary_trend_stats
            .iter()
            .map(|s| {
                let agg: Aggregation = s.parse().map_err(|e| {
                    LoadTestError::validation(format!("summary_trend_stats entry '{s}': {e}"))
                })?;
                if !agg.applies_to(MetricKind::Trend) {
                    return Err(LoadTestError::validation(format!(
                        "summary_trend_stats entry '{s}' does not apply to trends"
                    )));
                }
                Ok(agg)
            })
            .collect()
    }

    /// Validate that the plan is semantically correct.
    ///
    /// Checks:
    /// - At least one stage; settings within range
    /// - Custom metrics do not clash with built-ins
    /// - Every threshold parses and fits its metric's kind
    /// - Every metric referenced by the iteration exists with the right kind
    /// - Every request URL renders to a valid URL and every check is well formed
    pub fn validate(&self) -> Result<(), LoadTestError> {
        if self.stages.is_empty() {
            return Err(LoadTestError::validation(
                "Plan must contain at least one [[stages]] entry",
            ));
        }
        let schedule = self
            .stages
            .iter()
            .try_fold(Duration::ZERO, |acc, s| acc.checked_add(s.duration.as_duration()))
            .filter(|total| *total <= MAX_SCHEDULE);
        if schedule.is_none() {
            return Err(LoadTestError::validation(format!(
                "stages must add up to at most {}",
                humantime::format_duration(MAX_SCHEDULE)
            )));
        }
        let tick = self.settings.tick.as_duration();
        if tick.is_zero() || tick > MAX_TICK {
            return Err(LoadTestError::validation(format!(
                "settings.tick must be between 1ms and 1s, got {}",
                self.settings.tick
            )));
        }
        if self.settings.timeout.as_duration().is_zero() {
            return Err(LoadTestError::validation("settings.timeout must be positive"));
        }
        if let Some(base) = &self.base_url {
            template::check_url(base).map_err(|source| LoadTestError::Template {
                request: "base_url".to_string(),
                source,
            })?;
        }

        let registry = self.build_registry()?;
        self.threshold_expressions(&registry)?;
        self.trend_stats()?;

        if self.iteration.steps.is_empty() {
            return Err(LoadTestError::validation(
                "iteration must contain at least one step",
            ));
        }
        if let Some(gauge) = &self.iteration.active_gauge {
            expect_kind(&registry, gauge, MetricKind::Gauge, "iteration.active_gauge")?;
        }
        for (i, step) in self.iteration.steps.iter().enumerate() {
            let Some(group) = step.group() else {
                continue;
            };
            self.validate_group(&registry, i + 1, step, group)?;
        }
        Ok(())
    }

    fn validate_group(
        &self,
        registry: &MetricRegistry,
        position: usize,
        step: &Step,
        group: &RequestGroup,
    ) -> Result<(), LoadTestError> {
        if group.requests.is_empty() {
            return Err(LoadTestError::validation(format!(
                "{} step {position} has no requests",
                step.kind_name()
            )));
        }
        if matches!(step, Step::Random(_)) {
            let total = group
                .requests
                .iter()
                .try_fold(0u32, |acc, r| acc.checked_add(r.weight));
            match total {
                Some(0) => {
                    return Err(LoadTestError::validation(format!(
                        "random step {position} needs at least one request with weight > 0"
                    )))
                }
                None => {
                    return Err(LoadTestError::validation(format!(
                        "random step {position} weights add up to more than {}",
                        u32::MAX
                    )))
                }
                Some(_) => {}
            }
        }
        if let Some(metric) = &group.error_metric {
            expect_kind(registry, metric, MetricKind::Rate, "error_metric")?;
        }
        if let Some(metric) = &group.trend {
            expect_kind(registry, metric, MetricKind::Trend, "trend")?;
        }

        for request in &group.requests {
            self.validate_request(request)?;
            for metric in &request.metrics {
                if registry.kind_of(metric).is_none() {
                    return Err(LoadTestError::validation(format!(
                        "request '{}' feeds undeclared metric '{metric}'",
                        request.display_name()
                    )));
                }
            }
            for check in &request.checks {
                check.validate()?;
            }
            if request.expected_status.as_ref().is_some_and(Vec::is_empty) {
                return Err(LoadTestError::validation(format!(
                    "request '{}' has an empty expected_status list",
                    request.display_name()
                )));
            }
        }
        Ok(())
    }

    fn validate_request(&self, request: &RequestSpec) -> Result<(), LoadTestError> {
        let template_err = |source: TemplateError| LoadTestError::Template {
            request: request.display_name(),
            source,
        };
        let template = UrlTemplate::parse(&request.url).map_err(template_err)?;
        template
            .check_variables(&self.variables)
            .map_err(template_err)?;
        let rendered = template.render(Variables {
            plan: &self.variables,
            vu: 1,
            iteration: 0,
        });
        let resolved = resolve_url(self.base_url.as_deref(), &rendered);
        template::check_url(&resolved).map_err(template_err)?;
        if request
            .timeout
            .is_some_and(|t| t.as_duration().is_zero())
        {
            return Err(LoadTestError::validation(format!(
                "request '{}' has a zero timeout",
                request.display_name()
            )));
        }
        Ok(())
    }
}

fn parse_metric_key(raw: &str) -> Result<MetricKey, LoadTestError> {
    MetricKey::parse(raw).map_err(|source| LoadTestError::Threshold {
        metric: raw.to_string(),
        expression: String::new(),
        source,
    })
}

fn expect_kind(
    registry: &MetricRegistry,
    name: &str,
    kind: MetricKind,
    field: &str,
) -> Result<(), LoadTestError> {
    match registry.kind_of(name) {
        Some(actual) if actual == kind => Ok(()),
        Some(actual) => Err(LoadTestError::validation(format!(
            "{field} '{name}' must be a {kind} metric, but it is a {actual}"
        ))),
        None => Err(LoadTestError::validation(format!(
            "{field} references undeclared metric '{name}'"
        ))),
    }
}

/// Default error metric for groups that do not name one.
pub fn default_error_metric() -> &'static str {
    builtin::ERRORS
}
