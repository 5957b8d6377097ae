use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a step did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    /// The tool returned an error or an unsuccessful result.
    ToolFailed,
    Timeout,
    Cancelled,
    /// An input reference could not be resolved.
    InputResolution,
    /// Not run because a dependency did not succeed.
    UpstreamFailed,
    /// Not run (or interrupted) because the run aborted under the abort policy.
    Aborted,
    /// The tool panicked.
    Panicked,
}

impl StepErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolFailed => "tool_failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::InputResolution => "input_resolution",
            Self::UpstreamFailed => "upstream_failed",
            Self::Aborted => "aborted",
            Self::Panicked => "panicked",
        }
    }
}

impl fmt::Display for StepErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: StepErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: StepErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn upstream_failed(dependency: &str) -> Self {
        Self::new(
            StepErrorKind::UpstreamFailed,
            format!("skipped, upstream failure: {dependency}"),
        )
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of one step. `error` is present iff `success` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub tool_id: String,
    pub status: StepStatus,
    pub success: bool,

    /// Value handed to dependents; `null` unless the step succeeded.
    #[serde(default)]
    pub output: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,

    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl StepResult {
    pub fn succeeded(step_id: impl Into<String>, tool_id: impl Into<String>, output: Value) -> Self {
        Self {
            step_id: step_id.into(),
            tool_id: tool_id.into(),
            status: StepStatus::Succeeded,
            success: true,
            output,
            error: None,
            duration_ms: 0,
            confidence: None,
            operation_id: None,
            started_at: None,
        }
    }

    pub fn failed(step_id: impl Into<String>, tool_id: impl Into<String>, error: StepError) -> Self {
        Self {
            step_id: step_id.into(),
            tool_id: tool_id.into(),
            status: StepStatus::Failed,
            success: false,
            output: Value::Null,
            error: Some(error),
            duration_ms: 0,
            confidence: None,
            operation_id: None,
            started_at: None,
        }
    }

    /// A step that was never dispatched.
    pub fn skipped(step_id: impl Into<String>, tool_id: impl Into<String>, error: StepError) -> Self {
        Self {
            status: StepStatus::Skipped,
            ..Self::failed(step_id, tool_id, error)
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_confidence(mut self, confidence: Option<f64>) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn error_kind(&self) -> Option<StepErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
