use std::sync::Arc;

use crate::config::AppConfig;
use crate::confidence::ConfidencePropagator;
use crate::error::OrchestratorError;
use crate::provenance::{InMemoryProvenance, ProvenanceRecorder};
use crate::tool::ToolRegistry;

/// Collaborators threaded through every run. Nothing here is process-global.
#[derive(Clone)]
pub struct Services {
    pub tools: Arc<ToolRegistry>,
    pub provenance: Arc<dyn ProvenanceRecorder>,
    pub confidence: Arc<ConfidencePropagator>,
}

impl Services {
    pub fn new(
        tools: ToolRegistry,
        provenance: Arc<dyn ProvenanceRecorder>,
        confidence: ConfidencePropagator,
    ) -> Self {
        Self {
            tools: Arc::new(tools),
            provenance,
            confidence: Arc::new(confidence),
        }
    }

    /// In-memory provenance and default confidence factors.
    pub fn with_tools(tools: ToolRegistry) -> Self {
        Self::new(
            tools,
            Arc::new(InMemoryProvenance::new()),
            ConfidencePropagator::default(),
        )
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("tools", &self.tools)
            .field("provenance", &self.provenance.name())
            .field("confidence", &self.confidence)
            .finish()
    }
}

/// Builds [`Services`] from configuration; implemented by the plugins crate.
#[async_trait::async_trait]
pub trait ServicesFactory: Send + Sync {
    async fn build_services(&self, cfg: &AppConfig) -> Result<Services, OrchestratorError>;
}
