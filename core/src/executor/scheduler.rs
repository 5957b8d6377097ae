use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;
use tracing::error;

use crate::error::OrchestratorError;

use super::step::StepRunner;
use super::types::{ExecutionContext, StepError, StepErrorKind, StepResult};

/// Execute a set of independent steps concurrently
///
/// # Arguments
///
/// * `step_ids` - Steps to run; none may depend on another in the set
/// * `ctx` - Run context the results are recorded into
/// * `max_concurrency` - Maximum number of steps in flight
/// * `runner` - Per-step runner
///
/// # Returns
///
/// The step results, sorted by step_id
pub async fn execute_batch_parallel(
    step_ids: &[String],
    ctx: &Arc<ExecutionContext>,
    max_concurrency: usize,
    runner: StepRunner,
) -> Result<Vec<StepResult>, OrchestratorError> {
    let sem = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut futs: FuturesUnordered<_> = FuturesUnordered::new();

    for id in step_ids {
        let step_id = id.clone();
        let sem = sem.clone();
        let ctx = ctx.clone();

        futs.push(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|_| OrchestratorError::engine("parallel", "semaphore closed unexpectedly"))?;

            let task_ctx = ctx.clone();
            let task_id = step_id.clone();
            let joined = tokio::spawn(async move { runner.run(&task_ctx, &task_id).await }).await;

            match joined {
                Ok(result) => Ok::<_, OrchestratorError>(result),
                Err(e) => {
                    error!(step_id = %step_id, error = %e, "step task did not complete");
                    let tool_id = ctx.step(&step_id).map(|s| s.tool.clone()).unwrap_or_default();
                    let result = StepResult::failed(
                        &step_id,
                        tool_id,
                        StepError::new(StepErrorKind::Panicked, e.to_string()),
                    );
                    ctx.record(result.clone());
                    ctx.on_step_failed(&step_id);
                    Ok(result)
                }
            }
        });
    }

    let mut results: Vec<StepResult> = Vec::with_capacity(step_ids.len());

    while let Some(res) = futs.next().await {
        results.push(res?);
    }

    results.sort_by(|a, b| a.step_id.cmp(&b.step_id));
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;

    use crate::config::FailurePolicy;
    use crate::context::Services;
    use crate::executor::graph::StepGraph;
    use crate::monitor::MonitorHub;
    use crate::tool::{Tool, ToolRegistry, ToolRequest, ToolResult};
    use crate::workflow::{WorkflowDefinition, WorkflowStep};

    struct Nap;

    #[async_trait]
    impl Tool for Nap {
        fn tool_id(&self) -> &str {
            "nap"
        }

        async fn execute(&self, request: ToolRequest) -> anyhow::Result<ToolResult> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(ToolResult::ok(Value::String(request.step_id)))
        }
    }

    fn context(ids: &[&str]) -> Arc<ExecutionContext> {
        let def = ids
            .iter()
            .fold(WorkflowDefinition::new("batch"), |def, id| {
                def.with_step(WorkflowStep::new(*id, "nap"))
            });
        let plan = StepGraph::from_definition(&def).unwrap().resolve().unwrap();
        Arc::new(ExecutionContext::new(
            Arc::new(def),
            Arc::new(plan),
            Services::with_tools(ToolRegistry::new().with(Arc::new(Nap))),
            Arc::new(MonitorHub::new()),
            FailurePolicy::default(),
            Duration::from_secs(5),
            CancellationToken::new(),
        ))
    }

    #[tokio::test]
    async fn test_batch_results_sorted_and_recorded() {
        let ctx = context(&["c", "a", "b"]);
        let ids: Vec<String> = vec!["c".into(), "a".into(), "b".into()];

        let results = execute_batch_parallel(&ids, &ctx, 2, StepRunner::new())
            .await
            .unwrap();

        let order: Vec<_> = results.iter().map(|r| r.step_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(ctx.results().len(), 3);
        assert!(ctx.peak_concurrency() <= 2);
    }
}
