use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use lineflow_core::config::{get_lineflow_data_dir, ProvenanceBackend, ProvenanceConfig};
use lineflow_core::monitor::ExecutionObserver;
use lineflow_core::provenance::{InMemoryProvenance, ProvenanceRecorder, SqliteProvenance};
use lineflow_core::ToolRegistry;

use crate::renderers::{JsonlEventRenderer, TextEventRenderer};
use crate::tools::{DelayTool, EchoTool, FailTool, GraphTool, MergeTool, TemplateTool};

/// Registry with every built-in tool.
pub fn build_tool_registry() -> ToolRegistry {
    ToolRegistry::new()
        .with(Arc::new(EchoTool))
        .with(Arc::new(TemplateTool))
        .with(Arc::new(MergeTool))
        .with(Arc::new(GraphTool))
        .with(Arc::new(FailTool))
        .with(Arc::new(DelayTool))
}

pub fn build_provenance(cfg: &ProvenanceConfig) -> Result<Arc<dyn ProvenanceRecorder>> {
    match cfg.backend {
        ProvenanceBackend::Memory => Ok(Arc::new(InMemoryProvenance::new())),
        ProvenanceBackend::Sqlite => {
            let path = match cfg.path.as_deref().map(str::trim) {
                Some(p) if !p.is_empty() => PathBuf::from(p),
                _ => get_lineflow_data_dir()?.join("provenance.db"),
            };
            tracing::debug!(path = %path.display(), "opening provenance store");
            Ok(Arc::new(SqliteProvenance::open(&path)?))
        }
    }
}

/// Event renderer for `--events`. `none` (or anything unknown) renders nothing.
pub fn build_event_renderer(format: &str) -> Option<Arc<dyn ExecutionObserver>> {
    match format {
        "jsonl" => Some(Arc::new(JsonlEventRenderer::new(false))),
        "text" => Some(Arc::new(TextEventRenderer::new(false))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_builtins() {
        let registry = build_tool_registry();
        for id in ["echo", "template", "merge", "graph", "fail", "delay"] {
            assert!(registry.contains(id), "missing {id}");
        }
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_sqlite_provenance_at_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ProvenanceConfig {
            backend: ProvenanceBackend::Sqlite,
            path: Some(dir.path().join("p.db").to_string_lossy().to_string()),
        };
        let store = build_provenance(&cfg).unwrap();
        assert_eq!(store.name(), "sqlite");
        assert!(dir.path().join("p.db").exists());
    }

    #[test]
    fn test_event_renderer_formats() {
        assert!(build_event_renderer("jsonl").is_some());
        assert!(build_event_renderer("text").is_some());
        assert!(build_event_renderer("none").is_none());
    }
}
