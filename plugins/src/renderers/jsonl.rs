use std::io::Write;

use chrono::Local;
use serde_json::{json, Value};

use lineflow_core::monitor::{ExecutionEvent, ExecutionObserver};

use super::LineSink;

/// One JSON object per event.
pub struct JsonlEventRenderer {
    pretty_print: bool,
    sink: LineSink,
}

impl JsonlEventRenderer {
    pub fn new(pretty_print: bool) -> Self {
        Self::to_writer(pretty_print, Box::new(std::io::stderr()))
    }

    pub fn to_writer(pretty_print: bool, out: Box<dyn Write + Send>) -> Self {
        Self {
            pretty_print,
            sink: LineSink::new(out),
        }
    }

    fn event_to_json(&self, event: &ExecutionEvent) -> Value {
        let ts = Local::now().to_rfc3339();
        match event {
            ExecutionEvent::RunStarted {
                execution_id,
                workflow,
                engine,
                total_steps,
                total_batches,
            } => json!({
                "v": 1,
                "event_type": "run.start",
                "ts": ts,
                "run_id": execution_id,
                "metadata": {
                    "workflow": workflow,
                    "engine": engine,
                    "total_steps": total_steps,
                    "total_batches": total_batches,
                }
            }),
            ExecutionEvent::BatchStarted {
                execution_id,
                batch_index,
                step_ids,
            } => json!({
                "v": 1,
                "event_type": "batch.start",
                "ts": ts,
                "run_id": execution_id,
                "metadata": {
                    "batch": batch_index,
                    "steps": step_ids,
                }
            }),
            ExecutionEvent::StepStarted {
                execution_id,
                step_id,
                tool_id,
                index,
            } => json!({
                "v": 1,
                "event_type": "step.start",
                "ts": ts,
                "run_id": execution_id,
                "step_id": step_id,
                "metadata": {
                    "tool": tool_id,
                    "index": index,
                }
            }),
            ExecutionEvent::StepCompleted {
                execution_id,
                step_id,
                tool_id,
                success,
                duration_ms,
                error_kind,
                error,
                confidence,
            } => json!({
                "v": 1,
                "event_type": "step.end",
                "ts": ts,
                "run_id": execution_id,
                "step_id": step_id,
                "metadata": {
                    "tool": tool_id,
                    "success": success,
                    "duration_ms": duration_ms,
                    "error_kind": error_kind,
                    "error": error,
                    "confidence": confidence,
                }
            }),
            ExecutionEvent::StepSkipped {
                execution_id,
                step_id,
                tool_id,
                reason,
                message,
            } => json!({
                "v": 1,
                "event_type": "step.skip",
                "ts": ts,
                "run_id": execution_id,
                "step_id": step_id,
                "metadata": {
                    "tool": tool_id,
                    "reason": reason,
                    "message": message,
                }
            }),
            ExecutionEvent::BatchCompleted {
                execution_id,
                batch_index,
                duration_ms,
            } => json!({
                "v": 1,
                "event_type": "batch.end",
                "ts": ts,
                "run_id": execution_id,
                "metadata": {
                    "batch": batch_index,
                    "duration_ms": duration_ms,
                }
            }),
            ExecutionEvent::RunCompleted {
                execution_id,
                status,
                duration_ms,
                succeeded,
                failed,
                skipped,
            } => json!({
                "v": 1,
                "event_type": "run.end",
                "ts": ts,
                "run_id": execution_id,
                "metadata": {
                    "status": status,
                    "succeeded": succeeded,
                    "failed": failed,
                    "skipped": skipped,
                    "duration_ms": duration_ms,
                }
            }),
        }
    }
}

impl ExecutionObserver for JsonlEventRenderer {
    fn name(&self) -> &str {
        "jsonl-renderer"
    }

    fn on_event(&self, event: &ExecutionEvent) {
        let value = self.event_to_json(event);
        let line = if self.pretty_print {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        };
        self.sink.write_line(&line.unwrap_or_else(|_| "{}".into()));
    }
}
