use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use crate::error::OrchestratorError;
use crate::executor::graph::ExecutionPlan;
use crate::executor::scheduler::execute_batch_parallel;
use crate::executor::step::StepRunner;
use crate::executor::traits::{EngineReport, WorkflowEngine};
use crate::executor::types::{EngineStatistics, ExecutionContext, ParallelStats};
use crate::monitor::ExecutionEvent;

/// Runs each ready batch on a bounded worker pool, batch after batch.
///
/// Steps marked non-parallel, or whose tool does not support parallel calls, run one at a
/// time after the concurrent part of their batch.
#[derive(Debug, Clone)]
pub struct ParallelEngine {
    max_workers: usize,
    runner: StepRunner,
}

impl ParallelEngine {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            runner: StepRunner::new(),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    fn partition(&self, batch: &[String], ctx: &ExecutionContext) -> (Vec<String>, Vec<String>) {
        batch.iter().cloned().partition(|step_id| {
            let Some(step) = ctx.step(step_id) else {
                return true;
            };
            let tool_parallel = ctx
                .services
                .tools
                .get(&step.tool)
                .map_or(true, |tool| tool.supports_parallel());
            step.parallel && tool_parallel
        })
    }
}

#[async_trait]
impl WorkflowEngine for ParallelEngine {
    fn name(&self) -> &str {
        "parallel"
    }

    async fn execute(
        &self,
        plan: &ExecutionPlan,
        ctx: Arc<ExecutionContext>,
    ) -> Result<EngineReport, OrchestratorError> {
        let mut stats = ParallelStats::default();

        for (batch_index, batch) in plan.batches.iter().enumerate() {
            let started = Instant::now();
            ctx.emit(ExecutionEvent::BatchStarted {
                execution_id: ctx.execution_id.clone(),
                batch_index,
                step_ids: batch.clone(),
            });

            let (concurrent, sequential) = self.partition(batch, &ctx);
            if !sequential.is_empty() {
                debug!(batch_index, steps = ?sequential, "sequential fallback within batch");
            }

            let mut results =
                execute_batch_parallel(&concurrent, &ctx, self.max_workers, self.runner).await?;
            for step_id in &sequential {
                results.push(self.runner.run(&ctx, step_id).await);
            }

            let wall_ms = started.elapsed().as_millis() as u64;
            let sum_step_ms = results.iter().map(|r| r.duration_ms).sum();
            stats.record_batch(sum_step_ms, wall_ms);

            ctx.emit(ExecutionEvent::BatchCompleted {
                execution_id: ctx.execution_id.clone(),
                batch_index,
                duration_ms: wall_ms,
            });
        }

        debug!(
            saved_ms = stats.saved_ms,
            ratio = stats.savings_ratio(),
            "parallel savings"
        );

        Ok(EngineReport {
            statistics: EngineStatistics {
                steps_dispatched: ctx.steps_dispatched(),
                peak_concurrency: ctx.peak_concurrency(),
                parallel: Some(stats),
            },
        })
    }
}
