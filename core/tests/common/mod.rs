#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use lineflow_core::confidence::ConfidencePropagator;
use lineflow_core::monitor::{ExecutionEvent, ExecutionObserver};
use lineflow_core::provenance::InMemoryProvenance;
use lineflow_core::{
    AppConfig, FailurePolicy, OptimizationLevel, Orchestrator, Tool, ToolRegistry, ToolRequest,
    ToolResult,
};

/// Returns its inputs; reports `inputs.confidence` as its confidence when present.
pub struct ScoreTool;

#[async_trait]
impl Tool for ScoreTool {
    fn tool_id(&self) -> &str {
        "score"
    }

    async fn execute(&self, request: ToolRequest) -> anyhow::Result<ToolResult> {
        let confidence = request.input("confidence").and_then(Value::as_f64);
        let mut result = ToolResult::ok(Value::Object(request.inputs));
        result.confidence = confidence;
        Ok(result)
    }
}

pub struct FailTool;

#[async_trait]
impl Tool for FailTool {
    fn tool_id(&self) -> &str {
        "fail"
    }

    async fn execute(&self, request: ToolRequest) -> anyhow::Result<ToolResult> {
        if let Some(ms) = request.input("after_ms").and_then(Value::as_u64) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        anyhow::bail!("step {} failed on purpose", request.step_id)
    }
}

/// Sleeps `inputs.ms` milliseconds, then returns its inputs.
pub struct SlowTool;

#[async_trait]
impl Tool for SlowTool {
    fn tool_id(&self) -> &str {
        "slow"
    }

    async fn execute(&self, request: ToolRequest) -> anyhow::Result<ToolResult> {
        let ms = request.input("ms").and_then(Value::as_u64).unwrap_or(10);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(ToolResult::ok(Value::Object(request.inputs)))
    }
}

pub struct PanicTool;

#[async_trait]
impl Tool for PanicTool {
    fn tool_id(&self) -> &str {
        "panic"
    }

    async fn execute(&self, _request: ToolRequest) -> anyhow::Result<ToolResult> {
        panic!("tool exploded")
    }
}

/// Emits a graph fragment built from `inputs.nodes` / `inputs.edges`.
pub struct FragmentTool;

#[async_trait]
impl Tool for FragmentTool {
    fn tool_id(&self) -> &str {
        "fragment"
    }

    async fn execute(&self, request: ToolRequest) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::ok(json!({
            "nodes": request.input("nodes").cloned().unwrap_or_else(|| json!([])),
            "edges": request.input("edges").cloned().unwrap_or_else(|| json!([])),
        })))
    }
}

/// Refuses concurrent invocation.
pub struct SerialTool;

#[async_trait]
impl Tool for SerialTool {
    fn tool_id(&self) -> &str {
        "serial"
    }

    fn supports_parallel(&self) -> bool {
        false
    }

    async fn execute(&self, request: ToolRequest) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::ok(Value::Object(request.inputs)))
    }
}

pub fn registry() -> ToolRegistry {
    ToolRegistry::new()
        .with(Arc::new(ScoreTool))
        .with(Arc::new(FailTool))
        .with(Arc::new(SlowTool))
        .with(Arc::new(PanicTool))
        .with(Arc::new(FragmentTool))
        .with(Arc::new(SerialTool))
}

pub fn config(level: OptimizationLevel, policy: FailurePolicy) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.orchestrator.optimization_level = level;
    cfg.orchestrator.failure_policy = policy;
    cfg.orchestrator.max_workers = 4;
    cfg.orchestrator.max_concurrent_tasks = 4;
    cfg
}

pub fn propagator() -> ConfidencePropagator {
    ConfidencePropagator::default()
        .with_factor("refine", 0.9)
        .and_then(|p| p.with_factor("summarize", 0.8))
        .expect("valid factors")
}

/// Orchestrator plus direct access to its in-memory provenance store.
pub fn orchestrator(
    level: OptimizationLevel,
    policy: FailurePolicy,
) -> (Orchestrator, Arc<InMemoryProvenance>) {
    let provenance = Arc::new(InMemoryProvenance::new());
    let orch = Orchestrator::builder(config(level, policy))
        .tools(registry())
        .provenance(provenance.clone())
        .confidence(propagator())
        .build()
        .expect("orchestrator builds");
    (orch, provenance)
}

/// Records every event it sees.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl EventLog {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ExecutionObserver for EventLog {
    fn name(&self) -> &str {
        "event-log"
    }

    fn on_event(&self, event: &ExecutionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
