#[allow(clippy::module_inception)]
pub mod error;
pub mod code;
pub mod orchestrator;
pub mod provenance;

pub use code::ErrorCode;
pub use error::CliError;
pub use orchestrator::{OrchestratorError, ValidationError};
pub use provenance::ProvenanceError;
