//! The iteration body every virtual user runs: steps, requests, pauses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::duration::PlanDuration;
use crate::check::Check;
use crate::transport::HttpMethod;

/// User logic for one iteration.
///
/// ```toml
/// [iteration]
/// active_gauge = "active_connections"
///
/// [[iteration.steps]]
/// type = "group"
/// name = "Projects API"
///   [[iteration.steps.requests]]
///   url = "/projects"
///
/// [[iteration.steps]]
/// type = "pause"
/// duration = "1s"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IterationSpec {
    /// Gauge moved `+1` when an iteration starts and `-1` when it ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_gauge: Option<String>,
    pub steps: Vec<Step>,
}

/// One step of an iteration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Requests issued one after another.
    Group(RequestGroup),
    /// Requests issued concurrently; responses are kept in declaration order.
    Batch(RequestGroup),
    /// One request picked by weight per iteration.
    Random(RequestGroup),
    /// Suspends this virtual user only.
    Pause(PauseSpec),
}

impl Step {
    pub fn group(&self) -> Option<&RequestGroup> {
        match self {
            Self::Group(g) | Self::Batch(g) | Self::Random(g) => Some(g),
            Self::Pause(_) => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Group(_) => "group",
            Self::Batch(_) => "batch",
            Self::Random(_) => "random",
            Self::Pause(_) => "pause",
        }
    }
}

/// A named set of requests with the metrics their results feed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RequestGroup {
    /// Group name, used as the `group` tag. Empty when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Rate that receives `1` for a response with a failed check and `0`
    /// otherwise. Defaults to the built-in `errors`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_metric: Option<String>,
    /// Step-scoped trend that receives every response duration in addition
    /// to `http_req_duration`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<String>,
    pub requests: Vec<RequestSpec>,
}

impl RequestGroup {
    pub fn group_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PauseSpec {
    pub duration: PlanDuration,
}

/// Request body: a raw string or a JSON document.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RequestBody {
    Text(String),
    Json(serde_json::Value),
}

/// One HTTP request of a step. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RequestSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub method: HttpMethod,
    /// Absolute URL or path relative to the plan's `base_url`; may contain
    /// `${variable}` placeholders.
    pub url: String,
    /// Merged over the plan's default headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Overrides `settings.timeout`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<PlanDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RequestBody>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<Check>,
    /// Statuses that count as success for `http_req_failed`. Defaults to 200..=399.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<Vec<u16>>,
    /// Selection weight inside a `random` step.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Custom metrics fed by this request's response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<String>,
}

fn default_weight() -> u32 {
    1
}

impl RequestSpec {
    /// Creates a `GET` request with defaults for everything else.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            name: None,
            method: HttpMethod::Get,
            url: url.into(),
            headers: BTreeMap::new(),
            timeout: None,
            body: None,
            checks: Vec::new(),
            expected_status: None,
            weight: default_weight(),
            metrics: Vec::new(),
        }
    }

    /// The request's name, or `METHOD url` when unnamed.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.method.as_str(), self.url))
    }

    /// Whether `status` counts as a successful response.
    pub fn is_expected_status(&self, status: u16) -> bool {
        match &self.expected_status {
            Some(list) => list.contains(&status),
            None => (200..=399).contains(&status),
        }
    }
}
