use thiserror::Error;

use super::code::ErrorCode;
use super::provenance::ProvenanceError;

/// Structural problems in a workflow definition, raised before any step executes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("step at position {0} has an empty id")]
    EmptyStepId(usize),

    #[error("duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("step '{0}' has an empty tool id")]
    EmptyToolId(String),

    #[error("dependency not found: step '{step_id}' depends on '{missing_dep}'")]
    DependencyNotFound { step_id: String, missing_dep: String },

    #[error("input '{param}' of step '{step_id}' references unknown step '{missing_step}'")]
    UnknownReference {
        step_id: String,
        param: String,
        missing_step: String,
    },

    #[error("exposed output '{name}' references unknown step '{missing_step}'")]
    UnknownOutputReference { name: String, missing_step: String },

    #[error("step '{step_id}' uses unregistered tool '{tool_id}'")]
    UnknownTool { step_id: String, tool_id: String },

    #[error("invalid workflow document: {0}")]
    Parse(String),
}

/// Errors that abort a workflow run (or prevent it from starting).
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("circular dependency detected: {}", .steps.join(" -> "))]
    Cycle { steps: Vec<String> },

    #[error("aggregation failed: {0}")]
    Aggregation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("engine '{engine}' failed: {message}")]
    Engine { engine: String, message: String },

    #[error("provenance error: {0}")]
    Provenance(#[from] ProvenanceError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    pub fn engine(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Map orchestrator error to protocol error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Validation(v) => v.error_code(),
            Self::Cycle { .. } => ErrorCode::CircularDependency,
            Self::Aggregation(_) => ErrorCode::AggregationError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Engine { .. } => ErrorCode::GeneralError,
            Self::Provenance(e) => e.error_code(),
            Self::Io(_) => ErrorCode::GeneralError,
        }
    }

    /// Whether the error was raised before any step could have run.
    pub fn is_pre_execution(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Cycle { .. } | Self::Config(_))
    }
}

impl ValidationError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyStepId(_) | Self::DuplicateStepId(_) | Self::EmptyToolId(_) => {
                ErrorCode::ValidationError
            }
            Self::DependencyNotFound { .. } => ErrorCode::DependencyError,
            Self::UnknownReference { .. } | Self::UnknownOutputReference { .. } => {
                ErrorCode::StepNotFound
            }
            Self::UnknownTool { .. } => ErrorCode::ToolNotFound,
            Self::Parse(_) => ErrorCode::ParseError,
        }
    }
}
