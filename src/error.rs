//! Error types for the stampede engine.
//!
//! [`LoadTestError`] covers everything that is fatal before or at the start of
//! a run: plan parsing, plan validation, registry invariant violations, and
//! report I/O. Per-request problems are [`TransportError`] values that travel
//! inside a response and are absorbed into metrics, never propagated.

use crate::metrics::MetricKind;

/// Errors that occur while loading, validating, or starting a test plan.
#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    /// TOML parse failure -- the plan contains invalid TOML syntax
    /// or does not match the expected schema.
    #[error("Failed to parse plan TOML: {source}")]
    PlanParse {
        #[from]
        source: toml::de::Error,
    },

    /// JSON parse failure for `.json` plan documents.
    #[error("Failed to parse plan JSON: {source}")]
    PlanParseJson {
        #[from]
        source: serde_json::Error,
    },

    /// Semantic validation failure -- the plan parsed but describes
    /// something the engine cannot run (no stages, unknown metric, ...).
    #[error("Plan validation error: {message}")]
    PlanValidation { message: String },

    /// A threshold expression could not be parsed or does not apply to the
    /// kind of metric it targets.
    #[error("Invalid threshold '{expression}' on '{metric}': {source}")]
    Threshold {
        metric: String,
        expression: String,
        source: ThresholdParseError,
    },

    /// A request URL template is malformed or references an unknown variable.
    #[error("Invalid URL for request '{request}': {source}")]
    Template {
        request: String,
        source: TemplateError,
    },

    /// File I/O failure -- the plan file could not be read from disk.
    #[error("Failed to read plan file '{path}': {source}")]
    PlanIo {
        source: std::io::Error,
        path: String,
    },

    /// The metric registry rejected a declaration.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The summary report could not be written.
    #[error("Failed to write report '{path}': {source}")]
    ReportIo {
        source: std::io::Error,
        path: String,
    },
}

impl LoadTestError {
    /// Returns `true` if this error means the plan itself is invalid.
    ///
    /// Configuration errors are reported before any virtual user starts and
    /// map to a dedicated process exit code.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::PlanParse { .. }
                | Self::PlanParseJson { .. }
                | Self::PlanValidation { .. }
                | Self::Threshold { .. }
                | Self::Template { .. }
                | Self::PlanIo { .. }
                | Self::Registry(_)
        )
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::PlanValidation {
            message: message.into(),
        }
    }
}

/// Metric registry invariant violations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A metric name was declared twice with different kinds.
    #[error("metric '{name}' is already declared as a {existing}, cannot redeclare it as a {requested}")]
    DuplicateMetric {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },

    /// A sample was written to a metric that was never declared.
    #[error("metric '{name}' is not declared")]
    UnknownMetric { name: String },
}

/// Threshold expression parse and applicability errors.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ThresholdParseError {
    /// The expression does not match `<aggregation> <comparator> <number>`.
    #[error("expected '<aggregation> <comparator> <number>', e.g. 'p(95)<500'")]
    Syntax,

    /// The aggregation name is not one of the supported operators.
    #[error("unknown aggregation '{0}'")]
    UnknownAggregation(String),

    /// The percentile in `p(N)` is outside `(0, 100]`.
    #[error("percentile {0} is outside (0, 100]")]
    PercentileRange(String),

    /// The bound is not a finite number.
    #[error("bound '{0}' is not a finite number")]
    Bound(String),

    /// The aggregation is meaningless for the metric's kind.
    #[error("aggregation '{aggregation}' cannot be applied to a {kind} metric")]
    KindMismatch {
        aggregation: String,
        kind: MetricKind,
    },

    /// The `metric{tag:value}` selector is malformed.
    #[error("malformed tag selector '{0}'")]
    Selector(String),
}

/// URL template errors detected at plan validation time.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `${` opened without a matching `}`.
    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),

    /// A placeholder name is empty or contains invalid characters.
    #[error("invalid placeholder name '{0}'")]
    InvalidName(String),

    /// A placeholder references a variable that is neither declared nor built in.
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    /// The URL does not parse after substitution.
    #[error("'{url}' is not a valid URL: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Transport-level failures carried inside a response.
///
/// These are never propagated as errors out of an iteration: the executor
/// records them as failed requests and moves on.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request exceeded its timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure (DNS resolution, TCP connect, TLS handshake).
    #[error("connection error: {message}")]
    Connection { message: String },

    /// Any other failure while sending the request or reading the body.
    #[error("request error: {message}")]
    Request { message: String },
}

impl TransportError {
    /// Returns the error category as a static string, used as the `error` tag.
    ///
    /// Categories: `"timeout"`, `"connection"`, `"request"`.
    pub fn error_category(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection { .. } => "connection",
            Self::Request { .. } => "request",
        }
    }

    /// Classify a [`reqwest::Error`] into the appropriate [`TransportError`] variant.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection {
                message: err.to_string(),
            }
        } else {
            Self::Request {
                message: err.to_string(),
            }
        }
    }
}
