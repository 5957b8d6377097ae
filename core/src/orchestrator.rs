use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregate::aggregator_for;
use crate::config::{AppConfig, OptimizationLevel, OrchestratorConfig};
use crate::confidence::ConfidencePropagator;
use crate::context::Services;
use crate::error::{OrchestratorError, ValidationError};
use crate::executor::{
    EngineRegistry, ExecutionContext, ExecutionPlan, ExecutionResult, ExecutionStatus,
    StepGraph, StepResult, StepStatus, WorkflowEngine,
};
use crate::monitor::{ExecutionEvent, ExecutionObserver, MonitorHub};
use crate::provenance::{InMemoryProvenance, ProvenanceRecorder, ProvenanceTrail};
use crate::tool::ToolRegistry;
use crate::workflow::{resolve_value, WorkflowDefinition};

/// Top-level coordinator: validates and resolves a definition, runs it on the engine
/// selected by the optimization level, and assembles the [`ExecutionResult`].
pub struct Orchestrator {
    config: OrchestratorConfig,
    services: Services,
    engines: EngineRegistry,
    monitors: Arc<MonitorHub>,
}

pub struct OrchestratorBuilder {
    config: AppConfig,
    services: Option<Services>,
    tools: Option<ToolRegistry>,
    provenance: Option<Arc<dyn ProvenanceRecorder>>,
    confidence: Option<ConfidencePropagator>,
    engines: Option<EngineRegistry>,
    observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl OrchestratorBuilder {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            services: None,
            tools: None,
            provenance: None,
            confidence: None,
            engines: None,
            observers: Vec::new(),
        }
    }

    /// Use a prebuilt service set; individual overrides below still apply on top.
    pub fn services(mut self, services: Services) -> Self {
        self.services = Some(services);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn provenance(mut self, provenance: Arc<dyn ProvenanceRecorder>) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn confidence(mut self, confidence: ConfidencePropagator) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn engines(mut self, engines: EngineRegistry) -> Self {
        self.engines = Some(engines);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let config = self.config.orchestrator;
        config.validate().map_err(OrchestratorError::Config)?;

        let mut services = match self.services {
            Some(services) => services,
            None => Services {
                tools: Arc::new(ToolRegistry::new()),
                provenance: Arc::new(InMemoryProvenance::new()),
                confidence: Arc::new(ConfidencePropagator::new(&self.config.confidence)?),
            },
        };
        if let Some(tools) = self.tools {
            services.tools = Arc::new(tools);
        }
        if let Some(provenance) = self.provenance {
            services.provenance = provenance;
        }
        if let Some(confidence) = self.confidence {
            services.confidence = Arc::new(confidence);
        }

        let engines = self
            .engines
            .unwrap_or_else(|| EngineRegistry::from_config(&config));

        let monitors = Arc::new(MonitorHub::new());
        for observer in self.observers {
            monitors.attach(observer);
        }

        Ok(Orchestrator {
            config,
            services,
            engines,
            monitors,
        })
    }
}

impl Orchestrator {
    pub fn builder(config: AppConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn monitors(&self) -> &Arc<MonitorHub> {
        &self.monitors
    }

    /// Safe at any time, including while a run is in progress.
    pub fn attach_observer(&self, observer: Arc<dyn ExecutionObserver>) {
        self.monitors.attach(observer);
    }

    pub fn detach_observer(&self, name: &str) -> bool {
        self.monitors.detach(name)
    }

    pub fn engine_for(&self, level: OptimizationLevel) -> Result<Arc<dyn WorkflowEngine>, OrchestratorError> {
        self.engines.get(level)
    }

    /// Structural checks plus tool availability. No side effects.
    pub fn validate(&self, definition: &WorkflowDefinition) -> Result<(), OrchestratorError> {
        definition.validate()?;
        for step in &definition.steps {
            if !self.services.tools.contains(&step.tool) {
                return Err(ValidationError::UnknownTool {
                    step_id: step.id.clone(),
                    tool_id: step.tool.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Validate and resolve into batches; cycles are reported here.
    pub fn plan(&self, definition: &WorkflowDefinition) -> Result<ExecutionPlan, OrchestratorError> {
        self.validate(definition)?;
        StepGraph::from_definition(definition)?.resolve()
    }

    pub async fn execute(&self, definition: &WorkflowDefinition) -> Result<ExecutionResult, OrchestratorError> {
        self.execute_with_cancel(definition, CancellationToken::new())
            .await
    }

    /// Run a workflow. Cancelling `cancel` stops dispatch of steps not yet started.
    pub async fn execute_with_cancel(
        &self,
        definition: &WorkflowDefinition,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, OrchestratorError> {
        let plan = self.plan(definition)?;
        let engine = self.engine_for(self.config.optimization_level)?;

        let ctx = Arc::new(ExecutionContext::new(
            Arc::new(definition.clone()),
            Arc::new(plan.clone()),
            self.services.clone(),
            self.monitors.clone(),
            self.config.failure_policy,
            Duration::from_millis(self.config.step_timeout_ms),
            cancel,
        ));

        info!(
            execution_id = %ctx.execution_id,
            workflow = %definition.name,
            engine = engine.name(),
            steps = plan.total_steps(),
            batches = plan.batches.len(),
            policy = self.config.failure_policy.as_str(),
            "workflow started"
        );
        ctx.emit(ExecutionEvent::RunStarted {
            execution_id: ctx.execution_id.clone(),
            workflow: definition.name.clone(),
            engine: engine.name().to_string(),
            total_steps: plan.total_steps(),
            total_batches: plan.batches.len(),
        });

        let start = Instant::now();
        let report = match engine.execute(&plan, ctx.clone()).await {
            Ok(report) => report,
            Err(e) => {
                self.finish_run(&ctx, ExecutionStatus::Failure, elapsed_ms(start)).await;
                return Err(e);
            }
        };

        let results = ctx.results();
        let status = ExecutionStatus::from_results(results.values(), ctx.is_aborted());
        let aggregated_output = match aggregator_for(&definition.outputs).aggregate(&results) {
            Ok(value) => value,
            Err(e) => {
                self.finish_run(&ctx, ExecutionStatus::Failure, elapsed_ms(start)).await;
                return Err(e);
            }
        };
        let exposed = expose_outputs(&ctx, definition, &results);
        let provenance = collect_trail(&ctx, &plan, &results);
        let duration_ms = elapsed_ms(start);

        self.finish_run(&ctx, status, duration_ms).await;
        info!(
            execution_id = %ctx.execution_id,
            status = %status,
            duration_ms,
            warnings = ctx.warnings().len(),
            "workflow finished"
        );

        Ok(ExecutionResult {
            execution_id: ctx.execution_id.clone(),
            workflow: definition.name.clone(),
            engine: engine.name().to_string(),
            status,
            results,
            aggregated_output,
            exposed,
            provenance,
            plan,
            statistics: report.statistics,
            warnings: ctx.warnings(),
            started_at: ctx.started_at,
            duration_ms,
        })
    }

    /// Emit `RunCompleted` and wait until observers have seen every event of the run.
    async fn finish_run(&self, ctx: &ExecutionContext, status: ExecutionStatus, duration_ms: u64) {
        let event = {
            let results = ctx.results();
            let count = |wanted: StepStatus| results.values().filter(|r| r.status == wanted).count();
            ExecutionEvent::RunCompleted {
                execution_id: ctx.execution_id.clone(),
                status,
                duration_ms,
                succeeded: count(StepStatus::Succeeded),
                failed: count(StepStatus::Failed),
                skipped: count(StepStatus::Skipped),
            }
        };
        ctx.emit(event);
        ctx.monitors.flush().await;
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Evaluate `outputs.expose`; failed or skipped steps contribute `null`.
fn expose_outputs(
    ctx: &ExecutionContext,
    definition: &WorkflowDefinition,
    results: &BTreeMap<String, StepResult>,
) -> Map<String, Value> {
    let lookup = |id: &str| {
        results
            .get(id)
            .map(|r| if r.success { r.output.clone() } else { Value::Null })
    };

    let mut exposed = Map::new();
    for (name, source) in &definition.outputs.expose {
        let value = match resolve_value(&Value::String(source.clone()), &lookup) {
            Ok(value) => value,
            Err(e) => {
                ctx.warn(format!("exposed output '{name}' unavailable: {e}"));
                Value::Null
            }
        };
        exposed.insert(name.clone(), value);
    }
    exposed
}

/// Operations recorded by this run, in execution order, with the lineage between them.
fn collect_trail(
    ctx: &ExecutionContext,
    plan: &ExecutionPlan,
    results: &BTreeMap<String, StepResult>,
) -> ProvenanceTrail {
    let operation_ids: Vec<String> = plan
        .flatten()
        .iter()
        .filter_map(|id| results.get(id).and_then(|r| r.operation_id.clone()))
        .collect();
    debug!(operations = operation_ids.len(), "collecting provenance trail");

    match ctx.services.provenance.trail(&operation_ids) {
        Ok(trail) => trail,
        Err(e) => {
            ctx.warn(format!("provenance trail unavailable: {e}"));
            ProvenanceTrail::default()
        }
    }
}
