//! Interchangeable execution strategies, one per optimization level.

mod parallel;
mod sequential;
mod structured;

pub use parallel::ParallelEngine;
pub use sequential::SequentialEngine;
pub use structured::StructuredEngine;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{OptimizationLevel, OrchestratorConfig};
use crate::error::OrchestratorError;

use super::traits::WorkflowEngine;

/// The single registry of engine strategies.
#[derive(Clone)]
pub struct EngineRegistry {
    engines: HashMap<OptimizationLevel, Arc<dyn WorkflowEngine>>,
}

impl EngineRegistry {
    pub fn empty() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    /// All three built-in engines, sized from config.
    pub fn from_config(cfg: &OrchestratorConfig) -> Self {
        let mut registry = Self::empty();
        registry.register(OptimizationLevel::Standard, Arc::new(SequentialEngine::new()));
        registry.register(
            OptimizationLevel::Optimized,
            Arc::new(ParallelEngine::new(cfg.max_workers)),
        );
        registry.register(
            OptimizationLevel::Enhanced,
            Arc::new(StructuredEngine::new(cfg.max_concurrent_tasks)),
        );
        registry
    }

    pub fn register(&mut self, level: OptimizationLevel, engine: Arc<dyn WorkflowEngine>) {
        self.engines.insert(level, engine);
    }

    pub fn get(&self, level: OptimizationLevel) -> Result<Arc<dyn WorkflowEngine>, OrchestratorError> {
        self.engines.get(&level).cloned().ok_or_else(|| {
            OrchestratorError::Config(format!("no engine registered for level '{level}'"))
        })
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<(&str, &str)> = self
            .engines
            .iter()
            .map(|(level, engine)| (level.as_str(), engine.name()))
            .collect();
        entries.sort();
        f.debug_map().entries(entries).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_map_to_engines() {
        let registry = EngineRegistry::from_config(&OrchestratorConfig::default());
        assert_eq!(registry.get(OptimizationLevel::Standard).unwrap().name(), "sequential");
        assert_eq!(registry.get(OptimizationLevel::Optimized).unwrap().name(), "parallel");
        assert_eq!(registry.get(OptimizationLevel::Enhanced).unwrap().name(), "structured");
    }

    #[test]
    fn test_missing_engine_is_config_error() {
        let registry = EngineRegistry::empty();
        assert!(matches!(
            registry.get(OptimizationLevel::Enhanced),
            Err(OrchestratorError::Config(_))
        ));
    }
}
