use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use super::types::{ExecutionContext, StepError, StepErrorKind, StepResult};
use crate::confidence::{clamp_confidence, ConfidencePropagator};
use crate::monitor::ExecutionEvent;
use crate::provenance::DERIVED_FROM;
use crate::tool::{ExecutionHints, ToolRequest, ToolResult};
use crate::workflow::{resolve_inputs, WorkflowStep};

/// Runs one step end to end: gating, input resolution, provenance, dispatch, confidence,
/// result recording and monitor events. Shared by every engine.
#[derive(Debug, Clone, Copy)]
pub struct StepRunner {
    /// Whether an in-flight tool call is dropped when the run stops.
    interruptible: bool,
}

enum Dispatch {
    Finished(ToolResult),
    Failed(StepError),
}

impl StepRunner {
    /// In-flight steps always finish.
    pub fn new() -> Self {
        Self {
            interruptible: false,
        }
    }

    /// In-flight steps stop at their next suspension point on cancel or abort.
    pub fn interruptible() -> Self {
        Self {
            interruptible: true,
        }
    }

    #[instrument(skip(self, ctx), fields(execution_id = %ctx.execution_id))]
    pub async fn run(&self, ctx: &Arc<ExecutionContext>, step_id: &str) -> StepResult {
        let Some(step) = ctx.step(step_id).cloned() else {
            return ctx.skip(
                step_id,
                StepError::new(StepErrorKind::InputResolution, "step not in definition"),
            );
        };

        if let Some(reason) = ctx.blocked_by(step_id) {
            debug!(step_id, reason = %reason, "step not dispatched");
            return ctx.skip(step_id, reason);
        }

        let index = ctx.enter_flight();
        let result = self.dispatch(ctx, &step, index).await;
        ctx.leave_flight();

        ctx.record(result.clone());
        ctx.emit(ExecutionEvent::StepCompleted {
            execution_id: ctx.execution_id.clone(),
            step_id: result.step_id.clone(),
            tool_id: result.tool_id.clone(),
            success: result.success,
            duration_ms: result.duration_ms,
            error_kind: result.error_kind(),
            error: result.error.as_ref().map(|e| e.message.clone()),
            confidence: result.confidence,
        });
        if !result.success {
            ctx.on_step_failed(step_id);
        }
        result
    }

    async fn dispatch(
        &self,
        ctx: &Arc<ExecutionContext>,
        step: &WorkflowStep,
        index: usize,
    ) -> StepResult {
        ctx.emit(ExecutionEvent::StepStarted {
            execution_id: ctx.execution_id.clone(),
            step_id: step.id.clone(),
            tool_id: step.tool.clone(),
            index,
        });
        let started_at = Utc::now();
        let start = Instant::now();

        let timeout = step
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(ctx.default_timeout);

        // Failed upstream outputs resolve to null (only reachable under the continue policy)
        let lookup = |id: &str| {
            ctx.result(id)
                .map(|r| if r.success { r.output } else { Value::Null })
        };
        let resolved = resolve_inputs(&step.inputs, &lookup);

        let recorded_inputs = match &resolved {
            Ok(inputs) => Value::Object(inputs.clone()),
            Err(_) => Value::Object(step.inputs.clone()),
        };
        let operation_id = self.start_operation(ctx, step, &recorded_inputs, timeout);
        if let Some(op_id) = &operation_id {
            self.link_upstream(ctx, step, op_id);
        }

        let outcome = match resolved {
            Ok(inputs) => self.invoke(ctx, step, inputs, timeout).await,
            Err(message) => Dispatch::Failed(StepError::new(StepErrorKind::InputResolution, message)),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let mut result = match outcome {
            Dispatch::Finished(tool_result) if tool_result.success => {
                let confidence = step_confidence(
                    &ctx.services.confidence,
                    &upstream_confidences(ctx, step),
                    tool_result.confidence,
                    step.op_type(),
                );
                StepResult::succeeded(&step.id, &step.tool, tool_result.output)
                    .with_confidence(confidence)
            }
            Dispatch::Finished(tool_result) => StepResult::failed(
                &step.id,
                &step.tool,
                StepError::new(
                    StepErrorKind::ToolFailed,
                    tool_result
                        .error
                        .unwrap_or_else(|| "tool reported failure".to_string()),
                ),
            ),
            Dispatch::Failed(error) => StepResult::failed(&step.id, &step.tool, error),
        };
        result.duration_ms = duration_ms;
        result.started_at = Some(started_at);
        result.operation_id = operation_id;

        if let Some(op_id) = &result.operation_id {
            self.complete_operation(ctx, op_id, &result);
        }
        result
    }

    async fn invoke(
        &self,
        ctx: &Arc<ExecutionContext>,
        step: &WorkflowStep,
        inputs: Map<String, Value>,
        timeout: Duration,
    ) -> Dispatch {
        let Some(tool) = ctx.services.tools.get(&step.tool) else {
            return Dispatch::Failed(StepError::new(
                StepErrorKind::ToolFailed,
                format!("tool '{}' is not registered", step.tool),
            ));
        };

        let request = ToolRequest {
            tool_id: step.tool.clone(),
            step_id: step.id.clone(),
            execution_id: ctx.execution_id.clone(),
            inputs,
            hints: ExecutionHints {
                timeout: Some(timeout),
                parallel_eligible: step.parallel && tool.supports_parallel(),
            },
        };

        let call = tokio::time::timeout(timeout, AssertUnwindSafe(tool.execute(request)).catch_unwind());
        let stop = ctx.stop_token();

        let outcome = if self.interruptible {
            tokio::select! {
                biased;
                _ = stop.cancelled() => return Dispatch::Failed(interrupted(ctx)),
                outcome = call => outcome,
            }
        } else {
            call.await
        };

        match outcome {
            Ok(Ok(Ok(tool_result))) => Dispatch::Finished(tool_result),
            Ok(Ok(Err(e))) => Dispatch::Failed(StepError::new(StepErrorKind::ToolFailed, format!("{e:#}"))),
            Ok(Err(panic)) => Dispatch::Failed(StepError::new(
                StepErrorKind::Panicked,
                format!("tool panicked: {}", panic_message(panic.as_ref())),
            )),
            Err(_) => Dispatch::Failed(StepError::new(
                StepErrorKind::Timeout,
                format!("step timed out after {}ms", timeout.as_millis()),
            )),
        }
    }

    fn start_operation(
        &self,
        ctx: &ExecutionContext,
        step: &WorkflowStep,
        inputs: &Value,
        timeout: Duration,
    ) -> Option<String> {
        let mut parameters = Map::new();
        parameters.insert("step_id".into(), json!(step.id));
        parameters.insert("execution_id".into(), json!(ctx.execution_id));
        parameters.insert("timeout_ms".into(), json!(timeout.as_millis() as u64));
        parameters.insert("parallel".into(), json!(step.parallel));

        match ctx.services.provenance.start_operation(
            &step.tool,
            step.op_type(),
            inputs,
            &parameters,
        ) {
            Ok(id) => Some(id),
            Err(e) => {
                ctx.warn(format!("provenance start failed for step '{}': {e}", step.id));
                None
            }
        }
    }

    fn link_upstream(&self, ctx: &ExecutionContext, step: &WorkflowStep, operation_id: &str) {
        for dep in ctx.plan.upstream_of(&step.id) {
            let Some(source) = ctx.result(dep).and_then(|r| r.operation_id) else {
                continue;
            };
            if let Err(e) = ctx
                .services
                .provenance
                .add_lineage(&source, operation_id, DERIVED_FROM)
            {
                ctx.warn(format!(
                    "provenance lineage {dep} -> {} failed: {e}",
                    step.id
                ));
            }
        }
    }

    fn complete_operation(&self, ctx: &ExecutionContext, operation_id: &str, result: &StepResult) {
        let mut metadata = Map::new();
        metadata.insert("step_id".into(), json!(result.step_id));
        if let Some(confidence) = result.confidence {
            metadata.insert("confidence".into(), json!(confidence));
        }
        if let Some(error) = &result.error {
            metadata.insert("error_kind".into(), json!(error.kind));
        }

        if let Err(e) = ctx.services.provenance.complete_operation(
            operation_id,
            &result.output,
            result.success,
            result.error.as_ref().map(|e| e.message.as_str()),
            Some(&metadata),
        ) {
            ctx.warn(format!(
                "provenance completion failed for step '{}': {e}",
                result.step_id
            ));
        }
    }
}

impl Default for StepRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn interrupted(ctx: &ExecutionContext) -> StepError {
    if ctx.is_cancelled() {
        StepError::new(StepErrorKind::Cancelled, "cancelled while running")
    } else {
        StepError::new(StepErrorKind::Aborted, "interrupted by run abort")
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn upstream_confidences(ctx: &ExecutionContext, step: &WorkflowStep) -> Vec<f64> {
    ctx.plan
        .upstream_of(&step.id)
        .iter()
        .filter_map(|dep| ctx.result(dep).and_then(|r| r.confidence))
        .collect()
}

/// A step with no upstream confidence takes its tool's own value. Otherwise the upstream
/// values are aggregated and degraded by the step's operation type, then capped by the
/// tool's own value when it reports a lower one.
pub fn step_confidence(
    propagator: &ConfidencePropagator,
    upstream: &[f64],
    tool_confidence: Option<f64>,
    operation_type: &str,
) -> Option<f64> {
    let own = tool_confidence.map(clamp_confidence);
    if upstream.is_empty() {
        return own;
    }

    let propagated = propagator.propagate(propagator.aggregate(upstream), operation_type);
    Some(match own {
        Some(own) => propagated.min(own),
        None => propagated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregationMethod;

    fn propagator() -> ConfidencePropagator {
        ConfidencePropagator::default()
            .with_factor("extract", 0.8)
            .unwrap()
    }

    #[test]
    fn test_root_step_uses_tool_confidence() {
        let p = propagator();
        assert_eq!(step_confidence(&p, &[], Some(0.95), "extract"), Some(0.95));
        assert_eq!(step_confidence(&p, &[], None, "extract"), None);
        assert_eq!(step_confidence(&p, &[], Some(1.4), "extract"), Some(1.0));
    }

    #[test]
    fn test_child_is_degraded() {
        let p = propagator();
        let c = step_confidence(&p, &[0.9], None, "extract").unwrap();
        assert!((c - 0.72).abs() < 1e-9);
        let unknown = step_confidence(&p, &[0.9], None, "mystery").unwrap();
        assert!((unknown - 0.81).abs() < 1e-9);
    }

    #[test]
    fn test_tool_confidence_caps_propagated_value() {
        let p = propagator();
        assert_eq!(step_confidence(&p, &[1.0], Some(0.5), "extract"), Some(0.5));
        let c = step_confidence(&p, &[1.0], Some(0.99), "extract").unwrap();
        assert!((c - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_multiple_upstreams_use_method() {
        let p = propagator().with_method(AggregationMethod::Minimum);
        let c = step_confidence(&p, &[0.9, 0.5], None, "extract").unwrap();
        assert!((c - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_panic_message_variants() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
    }
}
