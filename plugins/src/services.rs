//! ServicesFactory implementation: builds tools, provenance store and confidence
//! propagator from config, shared by the CLI.
use async_trait::async_trait;

use lineflow_core::confidence::ConfidencePropagator;
use lineflow_core::{AppConfig, OrchestratorError, Services, ServicesFactory};

use crate::factory;

pub struct BuiltinServicesFactory;

impl Default for BuiltinServicesFactory {
    fn default() -> Self {
        Self
    }
}

#[async_trait]
impl ServicesFactory for BuiltinServicesFactory {
    async fn build_services(&self, cfg: &AppConfig) -> Result<Services, OrchestratorError> {
        let provenance = factory::build_provenance(&cfg.provenance)
            .map_err(|e| OrchestratorError::Config(format!("provenance store: {e:#}")))?;
        let confidence = ConfidencePropagator::new(&cfg.confidence)?;
        Ok(Services::new(
            factory::build_tool_registry(),
            provenance,
            confidence,
        ))
    }
}
