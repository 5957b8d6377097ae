use std::io::Write;

use lineflow_core::monitor::{ExecutionEvent, ExecutionObserver};

use super::LineSink;

/// Human-readable one-line-per-event log.
pub struct TextEventRenderer {
    ascii_only: bool,
    sink: LineSink,
}

impl TextEventRenderer {
    pub fn new(ascii_only: bool) -> Self {
        Self::to_writer(ascii_only, Box::new(std::io::stderr()))
    }

    pub fn to_writer(ascii_only: bool, out: Box<dyn Write + Send>) -> Self {
        Self {
            ascii_only,
            sink: LineSink::new(out),
        }
    }

    fn format_event(&self, event: &ExecutionEvent) -> String {
        match event {
            ExecutionEvent::RunStarted {
                execution_id,
                workflow,
                engine,
                total_steps,
                total_batches,
            } => format!(
                "RUN START {} ({}, engine {}, steps: {}, batches: {})",
                execution_id, workflow, engine, total_steps, total_batches
            ),
            ExecutionEvent::BatchStarted {
                execution_id,
                batch_index,
                step_ids,
            } => format!(
                "BATCH START {} (batch {}: {})",
                execution_id,
                batch_index,
                step_ids.join(", ")
            ),
            ExecutionEvent::StepStarted {
                execution_id,
                step_id,
                tool_id,
                index,
            } => format!(
                "STEP START {} (#{} {} via {})",
                execution_id, index, step_id, tool_id
            ),
            ExecutionEvent::StepCompleted {
                execution_id,
                step_id,
                success,
                duration_ms,
                error,
                confidence,
                ..
            } => {
                let status = match (*success, self.ascii_only) {
                    (true, true) => "OK",
                    (true, false) => "✓ SUCCESS",
                    (false, true) => "FAIL",
                    (false, false) => "✗ FAILED",
                };
                let mut line = format!(
                    "STEP END {} (step {}, status {}, duration {}ms",
                    execution_id, step_id, status, duration_ms
                );
                if let Some(c) = confidence {
                    line.push_str(&format!(", confidence {c:.3}"));
                }
                line.push(')');
                if let Some(msg) = error {
                    line.push_str(&format!(": {msg}"));
                }
                line
            }
            ExecutionEvent::StepSkipped {
                execution_id,
                step_id,
                reason,
                message,
                ..
            } => format!(
                "STEP SKIP {} (step {}, {}): {}",
                execution_id, step_id, reason, message
            ),
            ExecutionEvent::BatchCompleted {
                execution_id,
                batch_index,
                duration_ms,
            } => format!(
                "BATCH END {} (batch {}, {}ms)",
                execution_id, batch_index, duration_ms
            ),
            ExecutionEvent::RunCompleted {
                execution_id,
                status,
                duration_ms,
                succeeded,
                failed,
                skipped,
            } => format!(
                "RUN END {} ({}: succeeded {}, failed {}, skipped {}, duration {}ms)",
                execution_id, status, succeeded, failed, skipped, duration_ms
            ),
        }
    }
}

impl ExecutionObserver for TextEventRenderer {
    fn name(&self) -> &str {
        "text-renderer"
    }

    fn on_event(&self, event: &ExecutionEvent) {
        self.sink.write_line(&self.format_event(event));
    }
}
