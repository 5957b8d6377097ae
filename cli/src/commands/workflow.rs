//! `run`, `validate` and `plan`.
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use lineflow_core::config::ProvenanceBackend;
use lineflow_core::error::{CliError, ErrorCode};
use lineflow_core::executor::StepErrorKind;
use lineflow_core::monitor::{ErrorMonitor, PerformanceMonitor};
use lineflow_core::{
    AppConfig, ExecutionStatus, Orchestrator, ServicesFactory, StepResult, StepStatus,
    WorkflowDefinition,
};
use lineflow_plugins::factory::{build_event_renderer, build_tool_registry};
use lineflow_plugins::services::BuiltinServicesFactory;

use super::cli::{EventsArg, RunArgs, WorkflowArgs};
use crate::output::{render_plan, render_result};
use crate::progress::ProgressBars;

/// 0 success, 2 partial, 1 failure.
pub fn exit_code_for_status(status: ExecutionStatus) -> i32 {
    match status {
        ExecutionStatus::Success => 0,
        ExecutionStatus::Partial => 2,
        ExecutionStatus::Failure => 1,
    }
}

/// Like [`exit_code_for_status`], but a failed run that was cancelled exits with
/// `ErrorCode::Cancelled`, and one whose every failed step timed out with `ErrorCode::Timeout`.
pub fn exit_code_for_run(status: ExecutionStatus, results: &BTreeMap<String, StepResult>) -> i32 {
    if status != ExecutionStatus::Failure {
        return exit_code_for_status(status);
    }
    let kinds: Vec<StepErrorKind> = results.values().filter_map(|r| r.error_kind()).collect();
    if kinds.contains(&StepErrorKind::Cancelled) {
        return ErrorCode::Cancelled.as_u16() as i32;
    }
    let failed: Vec<StepErrorKind> = results
        .values()
        .filter(|r| r.status == StepStatus::Failed)
        .filter_map(|r| r.error_kind())
        .collect();
    if !failed.is_empty() && failed.iter().all(|k| *k == StepErrorKind::Timeout) {
        return ErrorCode::Timeout.as_u16() as i32;
    }
    exit_code_for_status(status)
}

/// Fold command line overrides into the loaded config.
pub fn apply_run_overrides(cfg: &mut AppConfig, args: &RunArgs) {
    if let Some(level) = args.level {
        cfg.orchestrator.optimization_level = level.into();
    }
    if let Some(workers) = args.workers {
        cfg.orchestrator.max_workers = workers;
        cfg.orchestrator.max_concurrent_tasks = workers;
    }
    if let Some(policy) = args.failure_policy {
        cfg.orchestrator.failure_policy = policy.into();
    }
    if let Some(ms) = args.timeout_ms {
        cfg.orchestrator.step_timeout_ms = ms;
    }
    if let Some(db) = &args.provenance_db {
        cfg.provenance.backend = ProvenanceBackend::Sqlite;
        cfg.provenance.path = Some(db.to_string_lossy().to_string());
    }
}

fn load_workflow(path: &Path) -> Result<WorkflowDefinition, CliError> {
    let def = WorkflowDefinition::from_path(path)?;
    tracing::debug!(workflow = %def.name, steps = def.steps.len(), "workflow loaded");
    Ok(def)
}

#[tracing::instrument(name = "cli.run", skip_all, fields(workflow = %args.workflow.display()))]
pub async fn run(args: RunArgs, mut cfg: AppConfig) -> Result<i32, CliError> {
    apply_run_overrides(&mut cfg, &args);
    let def = load_workflow(&args.workflow)?;

    let services = BuiltinServicesFactory.build_services(&cfg).await?;
    let errors = Arc::new(ErrorMonitor::new(cfg.monitoring.repeat_threshold));
    let performance = Arc::new(PerformanceMonitor::from_config(&cfg.monitoring));

    let mut builder = Orchestrator::builder(cfg.clone())
        .services(services)
        .observer(errors.clone())
        .observer(performance.clone());
    let renderer = match args.events {
        EventsArg::Jsonl => build_event_renderer("jsonl"),
        EventsArg::Text => build_event_renderer("text"),
        EventsArg::None => None,
    };
    if let Some(renderer) = renderer {
        builder = builder.observer(renderer);
    }
    if args.progress {
        builder = builder.observer(Arc::new(ProgressBars::new()));
    }
    let orchestrator = builder.build()?;

    if cfg.monitoring.performance {
        performance.start();
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling remaining steps");
            on_signal.cancel();
        }
    });

    let outcome = orchestrator.execute_with_cancel(&def, cancel).await;
    signal_task.abort();
    performance.stop();
    let result = outcome?;

    let summary = performance.summary();
    tracing::info!(
        samples = summary.samples,
        peak_cpu = summary.peak_cpu_percent,
        peak_memory_bytes = summary.peak_memory_bytes,
        "resource usage"
    );
    for pattern in errors.repeated_patterns() {
        tracing::warn!(
            tool = %pattern.tool_id,
            steps = ?pattern.step_ids,
            "tool failed in several steps"
        );
    }

    let format = args.format.map(Into::into).unwrap_or(def.outputs.format);
    let rendered = render_result(&result, format)?;
    println!("{}", rendered.trim_end());

    Ok(exit_code_for_run(result.status, &result.results))
}

fn offline_orchestrator(cfg: AppConfig) -> Result<Orchestrator, CliError> {
    Ok(Orchestrator::builder(cfg)
        .tools(build_tool_registry())
        .build()?)
}

pub fn validate(args: WorkflowArgs, cfg: AppConfig) -> Result<i32, CliError> {
    let def = load_workflow(&args.workflow)?;
    let orchestrator = offline_orchestrator(cfg)?;
    orchestrator.validate(&def)?;
    let plan = orchestrator.plan(&def)?;
    println!(
        "{}: ok ({} steps, {} batches)",
        def.name,
        plan.total_steps(),
        plan.batches.len()
    );
    Ok(0)
}

pub fn plan(args: WorkflowArgs, cfg: AppConfig) -> Result<i32, CliError> {
    let def = load_workflow(&args.workflow)?;
    let plan = offline_orchestrator(cfg)?.plan(&def)?;
    print!("{}", render_plan(&plan, args.format.into())?);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::commands::cli::{FormatArg, LevelArg, PolicyArg};
    use lineflow_core::{FailurePolicy, OptimizationLevel};

    fn run_args() -> RunArgs {
        RunArgs {
            workflow: PathBuf::from("wf.yaml"),
            level: Some(LevelArg::Optimized),
            workers: Some(3),
            failure_policy: Some(PolicyArg::Abort),
            timeout_ms: Some(1_500),
            format: None,
            events: EventsArg::None,
            progress: false,
            provenance_db: Some(PathBuf::from("/tmp/lineflow.db")),
        }
    }

    #[test]
    fn test_overrides_applied() {
        let mut cfg = AppConfig::default();
        apply_run_overrides(&mut cfg, &run_args());
        assert_eq!(cfg.orchestrator.optimization_level, OptimizationLevel::Optimized);
        assert_eq!(cfg.orchestrator.max_workers, 3);
        assert_eq!(cfg.orchestrator.max_concurrent_tasks, 3);
        assert_eq!(cfg.orchestrator.failure_policy, FailurePolicy::Abort);
        assert_eq!(cfg.orchestrator.step_timeout_ms, 1_500);
        assert_eq!(cfg.provenance.backend, ProvenanceBackend::Sqlite);
        assert_eq!(cfg.provenance.path.as_deref(), Some("/tmp/lineflow.db"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for_status(ExecutionStatus::Success), 0);
        assert_eq!(exit_code_for_status(ExecutionStatus::Partial), 2);
        assert_eq!(exit_code_for_status(ExecutionStatus::Failure), 1);
    }

    #[test]
    fn test_failed_run_exit_code_reflects_step_errors() {
        use lineflow_core::executor::StepError;

        let by_id = |entries: Vec<StepResult>| -> BTreeMap<String, StepResult> {
            entries.into_iter().map(|r| (r.step_id.clone(), r)).collect()
        };
        let failed = |id: &str, kind| StepResult::failed(id, "t", StepError::new(kind, "x"));
        let skipped = |id: &str, kind| StepResult::skipped(id, "t", StepError::new(kind, "x"));

        let timed_out = by_id(vec![
            failed("a", StepErrorKind::Timeout),
            skipped("b", StepErrorKind::UpstreamFailed),
        ]);
        assert_eq!(exit_code_for_run(ExecutionStatus::Failure, &timed_out), 30);
        assert_eq!(exit_code_for_run(ExecutionStatus::Partial, &timed_out), 2);

        let cancelled = by_id(vec![
            failed("a", StepErrorKind::ToolFailed),
            skipped("b", StepErrorKind::Cancelled),
        ]);
        assert_eq!(exit_code_for_run(ExecutionStatus::Failure, &cancelled), 31);

        let mixed = by_id(vec![
            failed("a", StepErrorKind::Timeout),
            failed("b", StepErrorKind::ToolFailed),
        ]);
        assert_eq!(exit_code_for_run(ExecutionStatus::Failure, &mixed), 1);
        assert_eq!(exit_code_for_run(ExecutionStatus::Success, &BTreeMap::new()), 0);
    }

    #[test]
    fn test_validate_and_plan_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.yaml");
        std::fs::write(
            &path,
            "name: demo\nsteps:\n  - id: a\n    tool: echo\n  - id: b\n    tool: template\n    inputs:\n      text: \"${a}\"\n",
        )
        .unwrap();

        let args = WorkflowArgs {
            workflow: path,
            format: FormatArg::Text,
        };
        assert_eq!(validate(args.clone(), AppConfig::default()).unwrap(), 0);
        assert_eq!(plan(args, AppConfig::default()).unwrap(), 0);
    }

    #[test]
    fn test_validate_rejects_unknown_tool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        std::fs::write(
            &path,
            r#"{"name": "demo", "steps": [{"id": "a", "tool": "nope"}]}"#,
        )
        .unwrap();

        let err = validate(
            WorkflowArgs {
                workflow: path,
                format: FormatArg::Text,
            },
            AppConfig::default(),
        ).unwrap_err();
        assert!(matches!(err, CliError::Orchestrator(_)));
    }
}
