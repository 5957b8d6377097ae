//! Workflow execution: dependency resolution and the engines that run a resolved plan.
//!
//! # Architecture
//!
//! ```text
//! WorkflowDefinition
//!   ↓
//! StepGraph::from_definition()   (explicit depends_on + inferred ${step.field} references)
//!   ↓
//! StepGraph::resolve() → ExecutionPlan { batches }   (Kahn, stable by declaration order)
//!   ↓
//! EngineRegistry::get(level) → Sequential | Parallel | Structured
//!   ↓
//! WorkflowEngine::execute(plan, ctx)   (each step through StepRunner)
//!   ↓
//! ExecutionContext results → aggregation → ExecutionResult
//! ```

pub mod engines;
mod graph;
mod scheduler;
mod step;
pub mod traits;
pub mod types;

pub use engines::{EngineRegistry, ParallelEngine, SequentialEngine, StructuredEngine};
pub use graph::{ExecutionPlan, StepGraph};
pub use scheduler::execute_batch_parallel;
pub use step::{step_confidence, StepRunner};
pub use traits::{EngineReport, WorkflowEngine};
pub use types::{
    EngineStatistics, ExecutionContext, ExecutionResult, ExecutionStatus, ParallelStats,
    StepError, StepErrorKind, StepResult, StepStatus,
};
