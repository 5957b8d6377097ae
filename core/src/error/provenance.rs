use thiserror::Error;

use super::code::ErrorCode;

/// Errors reported by a provenance recorder. These never abort a run on their own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvenanceError {
    #[error("operation not found: {0}")]
    OperationNotFound(String),

    #[error("operation already completed: {0}")]
    AlreadyCompleted(String),

    #[error("lineage edge may not reference itself: {0}")]
    SelfLoop(String),

    #[error("provenance store error: {0}")]
    Store(String),
}

impl ProvenanceError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::OperationNotFound(_) => ErrorCode::StepNotFound,
            _ => ErrorCode::ProvenanceError,
        }
    }
}

impl From<rusqlite::Error> for ProvenanceError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.to_string())
    }
}
