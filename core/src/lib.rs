//! Workflow orchestration core.
//!
//! A [`WorkflowDefinition`] is validated and resolved into an [`ExecutionPlan`] of ready
//! batches, run by one of the engines in [`executor::engines`], observed through
//! [`monitor`], merged by an [`aggregate`] strategy and recorded step by step through a
//! [`ProvenanceRecorder`] with propagated confidence scores.

pub mod aggregate;
pub mod confidence;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod orchestrator;
pub mod provenance;
pub mod tool;
pub mod workflow;

pub use config::{AppConfig, FailurePolicy, OptimizationLevel};
pub use context::{Services, ServicesFactory};
pub use error::{ErrorCode, OrchestratorError, ProvenanceError, ValidationError};
pub use executor::{ExecutionPlan, ExecutionResult, ExecutionStatus, StepResult, StepStatus};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use provenance::ProvenanceRecorder;
pub use tool::{Tool, ToolRegistry, ToolRequest, ToolResult};
pub use workflow::{WorkflowDefinition, WorkflowStep};
