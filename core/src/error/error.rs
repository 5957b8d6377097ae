use thiserror::Error;

use super::{OrchestratorError, ProvenanceError};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("orchestration failed: {0}")]
    Orchestrator(#[from] OrchestratorError),
    #[error("provenance error: {0}")]
    Provenance(#[from] ProvenanceError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}
