use std::sync::Arc;

use async_trait::async_trait;

use crate::error::OrchestratorError;
use crate::executor::graph::ExecutionPlan;
use crate::executor::types::{EngineStatistics, ExecutionContext};

/// What an engine reports back besides the step results it recorded in the context.
#[derive(Debug, Clone, Default)]
pub struct EngineReport {
    pub statistics: EngineStatistics,
}

/// Execution strategy. Engines differ only in scheduling; per-step semantics live in
/// [`StepRunner`](crate::executor::StepRunner).
///
/// On return every step of the plan has a result in the context and no task spawned by
/// the engine is still running.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        plan: &ExecutionPlan,
        ctx: Arc<ExecutionContext>,
    ) -> Result<EngineReport, OrchestratorError>;
}
