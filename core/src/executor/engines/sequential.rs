use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::OrchestratorError;
use crate::executor::graph::ExecutionPlan;
use crate::executor::step::StepRunner;
use crate::executor::traits::{EngineReport, WorkflowEngine};
use crate::executor::types::{EngineStatistics, ExecutionContext};
use crate::monitor::ExecutionEvent;

/// One step at a time, in resolved order. Deterministic baseline.
#[derive(Debug, Clone, Default)]
pub struct SequentialEngine {
    runner: StepRunner,
}

impl SequentialEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowEngine for SequentialEngine {
    fn name(&self) -> &str {
        "sequential"
    }

    async fn execute(
        &self,
        plan: &ExecutionPlan,
        ctx: Arc<ExecutionContext>,
    ) -> Result<EngineReport, OrchestratorError> {
        for (batch_index, batch) in plan.batches.iter().enumerate() {
            let started = Instant::now();
            ctx.emit(ExecutionEvent::BatchStarted {
                execution_id: ctx.execution_id.clone(),
                batch_index,
                step_ids: batch.clone(),
            });

            // Stopped runs still walk every step so each one is recorded as skipped
            for step_id in batch {
                self.runner.run(&ctx, step_id).await;
            }

            ctx.emit(ExecutionEvent::BatchCompleted {
                execution_id: ctx.execution_id.clone(),
                batch_index,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        Ok(EngineReport {
            statistics: EngineStatistics {
                steps_dispatched: ctx.steps_dispatched(),
                peak_concurrency: ctx.peak_concurrency(),
                parallel: None,
            },
        })
    }
}
