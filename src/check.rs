//! Named predicates over a completed response.
//!
//! A failing check is data, not an error: the executor turns each
//! [`CheckResult`] into samples for the `checks` rate and the group's error
//! rate and keeps going.

use serde::{Deserialize, Serialize};

use crate::error::LoadTestError;
use crate::transport::HttpResponse;

/// A check as written in the plan: an optional name plus a condition.
///
/// ```toml
/// checks = [
///   { name = "status is 200 or 304", type = "status", in = [200, 304] },
///   { type = "duration_below", ms = 1000 },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Check {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub condition: CheckCondition,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckCondition {
    /// Response status is one of the listed codes.
    Status {
        #[serde(rename = "in")]
        allowed: Vec<u16>,
    },
    /// Response took strictly less than `ms` milliseconds.
    DurationBelow { ms: f64 },
    /// Response body has at least one byte.
    BodyNotEmpty,
    /// Response body contains `text`.
    BodyContains { text: String },
    /// The request completed without a timeout or connection failure.
    NoTransportError,
}

/// Typed outcome of one check against one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
}

impl Check {
    pub fn new(condition: CheckCondition) -> Self {
        Self {
            name: None,
            condition,
        }
    }

    pub fn named(name: impl Into<String>, condition: CheckCondition) -> Self {
        Self {
            name: Some(name.into()),
            condition,
        }
    }

    /// The explicit name, or one derived from the condition.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.condition {
            CheckCondition::Status { allowed } => {
                let codes: Vec<String> = allowed.iter().map(u16::to_string).collect();
                format!("status in [{}]", codes.join(", "))
            }
            CheckCondition::DurationBelow { ms } => format!("duration < {ms}ms"),
            CheckCondition::BodyNotEmpty => "body is not empty".to_string(),
            CheckCondition::BodyContains { text } => format!("body contains '{text}'"),
            CheckCondition::NoTransportError => "no transport error".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), LoadTestError> {
        match &self.condition {
            CheckCondition::Status { allowed } if allowed.is_empty() => Err(
                LoadTestError::validation(format!("check '{}' lists no status codes", self.display_name())),
            ),
            CheckCondition::DurationBelow { ms } if !ms.is_finite() || *ms <= 0.0 => {
                Err(LoadTestError::validation(format!(
                    "check '{}' needs a positive 'ms'",
                    self.display_name()
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn evaluate(&self, response: &HttpResponse) -> CheckResult {
        let passed = match &self.condition {
            CheckCondition::Status { allowed } => allowed.contains(&response.status),
            CheckCondition::DurationBelow { ms } => response.duration_ms() < *ms,
            CheckCondition::BodyNotEmpty => response.body_size > 0,
            CheckCondition::BodyContains { text } => {
                String::from_utf8_lossy(&response.body).contains(text.as_str())
            }
            CheckCondition::NoTransportError => response.error.is_none(),
        };
        CheckResult {
            name: self.display_name(),
            passed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use bytes::Bytes;
    use std::time::Duration;

    fn response(status: u16, ms: u64, body: &'static str) -> HttpResponse {
        HttpResponse {
            status,
            duration: Duration::from_millis(ms),
            body_size: body.len() as u64,
            body: Bytes::from_static(body.as_bytes()),
            error: None,
        }
    }

    #[test]
    fn test_status_check() {
        let check = Check::named(
            "status is 200 or 304",
            CheckCondition::Status {
                allowed: vec![200, 304],
            },
        );
        assert!(check.evaluate(&response(304, 10, "")).passed);
        assert!(!check.evaluate(&response(500, 10, "")).passed);
        assert_eq!(check.evaluate(&response(200, 10, "")).name, "status is 200 or 304");
    }

    #[test]
    fn test_duration_and_body_checks() {
        let fast = response(200, 999, "x");
        let slow = response(200, 1000, "");
        let below = Check::new(CheckCondition::DurationBelow { ms: 1000.0 });
        assert!(below.evaluate(&fast).passed);
        assert!(!below.evaluate(&slow).passed, "bound is exclusive");

        let not_empty = Check::new(CheckCondition::BodyNotEmpty);
        assert!(not_empty.evaluate(&fast).passed);
        assert!(!not_empty.evaluate(&slow).passed);

        let contains = Check::new(CheckCondition::BodyContains {
            text: "\"id\"".to_string(),
        });
        assert!(contains.evaluate(&response(200, 1, "{\"id\":1}")).passed);
        assert!(!contains.evaluate(&fast).passed);
    }

    #[test]
    fn test_transport_failure_fails_checks() {
        let failed = HttpResponse::failed(TransportError::Timeout, Duration::from_secs(30));
        assert!(!Check::new(CheckCondition::NoTransportError).evaluate(&failed).passed);
        assert!(!Check::new(CheckCondition::Status { allowed: vec![200] })
            .evaluate(&failed)
            .passed);
    }

    #[test]
    fn test_default_names() {
        assert_eq!(
            Check::new(CheckCondition::Status {
                allowed: vec![200, 304]
            })
            .display_name(),
            "status in [200, 304]"
        );
        assert_eq!(
            Check::new(CheckCondition::DurationBelow { ms: 1000.0 }).display_name(),
            "duration < 1000ms"
        );
    }

    #[test]
    fn test_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            checks: Vec<Check>,
        }
        let doc: Doc = toml::from_str(
            r#"
            checks = [
              { name = "ok", type = "status", in = [200, 304] },
              { type = "duration_below", ms = 1000 },
              { type = "body_not_empty" },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(doc.checks.len(), 3);
        assert_eq!(doc.checks[0].name.as_deref(), Some("ok"));
        assert_eq!(
            doc.checks[1].condition,
            CheckCondition::DurationBelow { ms: 1000.0 }
        );
        assert_eq!(doc.checks[2].condition, CheckCondition::BodyNotEmpty);
    }

    #[test]
    fn test_validate_rejects_empty_status_list() {
        let check = Check::new(CheckCondition::Status { allowed: vec![] });
        assert!(check.validate().is_err());
    }
}
