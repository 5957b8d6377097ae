use serde::{Deserialize, Serialize};

use crate::executor::types::{ExecutionStatus, StepErrorKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    RunStarted {
        execution_id: String,
        workflow: String,
        engine: String,
        total_steps: usize,
        total_batches: usize,
    },
    BatchStarted {
        execution_id: String,
        batch_index: usize,
        step_ids: Vec<String>,
    },
    StepStarted {
        execution_id: String,
        step_id: String,
        tool_id: String,
        /// Dispatch ordinal within the run, starting at 0.
        index: usize,
    },
    StepCompleted {
        execution_id: String,
        step_id: String,
        tool_id: String,
        success: bool,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_kind: Option<StepErrorKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
    },
    StepSkipped {
        execution_id: String,
        step_id: String,
        tool_id: String,
        reason: StepErrorKind,
        message: String,
    },
    BatchCompleted {
        execution_id: String,
        batch_index: usize,
        duration_ms: u64,
    },
    RunCompleted {
        execution_id: String,
        status: ExecutionStatus,
        duration_ms: u64,
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            Self::RunStarted { execution_id, .. }
            | Self::BatchStarted { execution_id, .. }
            | Self::StepStarted { execution_id, .. }
            | Self::StepCompleted { execution_id, .. }
            | Self::StepSkipped { execution_id, .. }
            | Self::BatchCompleted { execution_id, .. }
            | Self::RunCompleted { execution_id, .. } => execution_id,
        }
    }

    /// The serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::BatchStarted { .. } => "batch_started",
            Self::StepStarted { .. } => "step_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::StepSkipped { .. } => "step_skipped",
            Self::BatchCompleted { .. } => "batch_completed",
            Self::RunCompleted { .. } => "run_completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_tagged_by_type() {
        let event = ExecutionEvent::StepSkipped {
            execution_id: "run-1".into(),
            step_id: "c".into(),
            tool_id: "echo".into(),
            reason: StepErrorKind::UpstreamFailed,
            message: "a failed".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], json!(event.kind()));
        assert_eq!(value["reason"], json!("upstream_failed"));
        assert_eq!(event.execution_id(), "run-1");
    }
}
