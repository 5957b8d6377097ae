use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::OrchestratorError;
use crate::executor::graph::ExecutionPlan;
use crate::executor::step::StepRunner;
use crate::executor::traits::{EngineReport, WorkflowEngine};
use crate::executor::types::{
    EngineStatistics, ExecutionContext, StepError, StepErrorKind, StepResult,
};

/// Dependency-driven nursery: a step is spawned as soon as its dependencies finish, with a
/// ceiling on concurrently running tasks independent of batch shape.
///
/// Every spawned task is joined before `execute` returns. On cancel or abort, in-flight
/// steps stop at their next suspension point and the rest are recorded as skipped.
#[derive(Debug, Clone)]
pub struct StructuredEngine {
    max_tasks: usize,
    runner: StepRunner,
}

impl StructuredEngine {
    pub fn new(max_tasks: usize) -> Self {
        Self {
            max_tasks: max_tasks.max(1),
            runner: StepRunner::interruptible(),
        }
    }

    pub fn max_tasks(&self) -> usize {
        self.max_tasks
    }
}

#[async_trait]
impl WorkflowEngine for StructuredEngine {
    fn name(&self) -> &str {
        "structured"
    }

    async fn execute(
        &self,
        plan: &ExecutionPlan,
        ctx: Arc<ExecutionContext>,
    ) -> Result<EngineReport, OrchestratorError> {
        let order = plan.flatten();
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.as_str(), idx))
            .collect();

        let mut pending: HashMap<&str, usize> = HashMap::with_capacity(order.len());
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for step_id in &order {
            let deps = plan.upstream_of(step_id);
            pending.insert(step_id.as_str(), deps.len());
            for dep in deps {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(step_id.as_str());
            }
        }

        let mut ready: VecDeque<&str> = order
            .iter()
            .map(String::as_str)
            .filter(|id| pending[id] == 0)
            .collect();

        let sem = Arc::new(Semaphore::new(self.max_tasks));
        let mut nursery: JoinSet<(String, StepResult)> = JoinSet::new();

        loop {
            while let Some(step_id) = ready.pop_front() {
                let sem = sem.clone();
                let ctx = ctx.clone();
                let runner = self.runner;
                let step_id = step_id.to_string();

                nursery.spawn(async move {
                    let result = match sem.acquire_owned().await {
                        Ok(_permit) => {
                            AssertUnwindSafe(runner.run(&ctx, &step_id))
                                .catch_unwind()
                                .await
                        }
                        Err(_) => Ok(ctx.skip(
                            &step_id,
                            StepError::new(StepErrorKind::Aborted, "task limiter closed"),
                        )),
                    };
                    let result = result.unwrap_or_else(|_| {
                        let tool_id = ctx.step(&step_id).map(|s| s.tool.clone()).unwrap_or_default();
                        let failed = StepResult::failed(
                            &step_id,
                            tool_id,
                            StepError::new(StepErrorKind::Panicked, "step task panicked"),
                        );
                        ctx.record(failed.clone());
                        ctx.on_step_failed(&step_id);
                        failed
                    });
                    (step_id, result)
                });
            }

            let Some(joined) = nursery.join_next().await else {
                break;
            };
            let (step_id, _result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(error = %e, "structured task failed to join");
                    continue;
                }
            };

            let mut released: Vec<&str> = Vec::new();
            if let Some(children) = dependents.get(step_id.as_str()) {
                for &child in children {
                    if let Some(count) = pending.get_mut(child) {
                        *count -= 1;
                        if *count == 0 {
                            released.push(child);
                        }
                    }
                }
            }
            released.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
            ready.extend(released);
        }

        // A task that failed to join leaves its dependents unreleased
        let missing: Vec<String> = order
            .iter()
            .filter(|id| !ctx.has_result(id))
            .cloned()
            .collect();
        for step_id in missing {
            debug!(step_id = %step_id, "no result after nursery drained");
            ctx.skip(
                &step_id,
                StepError::new(StepErrorKind::Aborted, "not scheduled: upstream task was lost"),
            );
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
