mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::{orchestrator, EventLog};
use lineflow_core::executor::StepErrorKind;
use lineflow_core::provenance::{LineageDirection, ProvenanceRecorder};
use lineflow_core::{
    ExecutionStatus, FailurePolicy, OptimizationLevel, OrchestratorError, StepStatus,
    ValidationError, WorkflowDefinition, WorkflowStep,
};

fn chain() -> WorkflowDefinition {
    WorkflowDefinition::new("chain")
        .with_step(WorkflowStep::new("a", "score").input("confidence", 0.95))
        .with_step(
            WorkflowStep::new("b", "score")
                .operation_type("refine")
                .input("text", "${a}"),
        )
        .with_step(
            WorkflowStep::new("c", "score")
                .operation_type("summarize")
                .input("text", "${b.text}"),
        )
}

#[tokio::test]
async fn linear_chain_degrades_confidence() {
    let (orch, provenance) = orchestrator(OptimizationLevel::Standard, FailurePolicy::default());
    let result = orch.execute(&chain()).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    let a = result.step("a").unwrap().confidence.unwrap();
    let b = result.step("b").unwrap().confidence.unwrap();
    let c = result.step("c").unwrap().confidence.unwrap();
    assert!((a - 0.95).abs() < 1e-9);
    assert!((b - 0.95 * 0.9).abs() < 1e-9);
    assert!((c - 0.95 * 0.9 * 0.8).abs() < 1e-9);
    assert!((0.0..=1.0).contains(&c));

    // b received a's whole output, c the nested field
    assert_eq!(result.step("c").unwrap().output["text"], json!({"confidence": 0.95}));

    let stats = provenance.get_statistics().unwrap();
    assert_eq!(stats.total_operations, 3);
    assert_eq!(stats.success_count, 3);
    assert_eq!(stats.lineage_edges, 2);

    let a_op = result.step("a").unwrap().operation_id.clone().unwrap();
    let b_op = result.step("b").unwrap().operation_id.clone().unwrap();
    let upstream = provenance.get_lineage(&b_op, LineageDirection::Upstream).unwrap();
    assert_eq!(upstream[0].source_operation_id, a_op);
    assert_eq!(result.provenance.operations.len(), 3);
}

#[tokio::test]
async fn failed_branch_skips_dependents() {
    let def = WorkflowDefinition::new("fan-in")
        .with_step(WorkflowStep::new("a", "fail"))
        .with_step(WorkflowStep::new("b", "score").input("x", 1))
        .with_step(
            WorkflowStep::new("c", "score")
                .input("left", "${a}")
                .input("right", "${b}"),
        );

    for level in OptimizationLevel::all() {
        let (orch, provenance) = orchestrator(level, FailurePolicy::default());
        let result = orch.execute(&def).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Partial, "{level}");
        assert_eq!(result.step("a").unwrap().status, StepStatus::Failed);
        assert_eq!(result.step("b").unwrap().status, StepStatus::Succeeded);

        let c = result.step("c").unwrap();
        assert_eq!(c.status, StepStatus::Skipped);
        assert_eq!(c.error_kind(), Some(StepErrorKind::UpstreamFailed));
        assert!(c.error.as_ref().unwrap().message.contains("upstream failure: a"));

        let stats = provenance.get_statistics().unwrap();
        assert_eq!(stats.total_operations, 2, "skipped steps record no operation");
        assert_eq!(stats.failure_count, 1);
        assert_eq!(result.aggregated_output["skipped"], json!(["c"]));
    }
}

#[tokio::test]
async fn unknown_dependency_rejected_before_any_operation() {
    let def = WorkflowDefinition::new("broken")
        .with_step(WorkflowStep::new("a", "score"))
        .with_step(WorkflowStep::new("b", "score").depends_on("ghost"));

    let (orch, provenance) = orchestrator(OptimizationLevel::Standard, FailurePolicy::default());
    let err = orch.execute(&def).await.unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Validation(ValidationError::DependencyNotFound { .. })
    ));
    assert!(err.is_pre_execution());
    assert_eq!(provenance.get_statistics().unwrap().total_operations, 0);
}

#[tokio::test]
async fn abort_policy_stops_dispatch() {
    let def = WorkflowDefinition::new("abort")
        .with_step(WorkflowStep::new("a", "fail"))
        .with_step(WorkflowStep::new("b", "score"))
        .with_step(WorkflowStep::new("c", "score").depends_on("b"));

    let (orch, provenance) = orchestrator(OptimizationLevel::Standard, FailurePolicy::Abort);
    let result = orch.execute(&def).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Failure);
    for id in ["b", "c"] {
        let step = result.step(id).unwrap();
        assert_eq!(step.status, StepStatus::Skipped);
        assert_eq!(step.error_kind(), Some(StepErrorKind::Aborted));
    }
    assert_eq!(provenance.get_statistics().unwrap().total_operations, 1);
}

#[tokio::test]
async fn continue_policy_passes_null_for_failed_outputs() {
    let def = WorkflowDefinition::new("continue")
        .with_step(WorkflowStep::new("a", "fail"))
        .with_step(
            WorkflowStep::new("b", "score")
                .input("whole", "${a}")
                .input("field", "${a.value}"),
        );

    let (orch, _) = orchestrator(OptimizationLevel::Enhanced, FailurePolicy::Continue);
    let result = orch.execute(&def).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Partial);
    let b = result.step("b").unwrap();
    assert!(b.success);
    assert_eq!(b.output, json!({"whole": null, "field": null}));
}

#[tokio::test]
async fn timed_out_step_has_timeout_kind() {
    let def = WorkflowDefinition::new("timeout").with_step(
        WorkflowStep::new("slow", "slow")
            .input("ms", 2_000)
            .timeout_ms(30),
    );

    let (orch, provenance) = orchestrator(OptimizationLevel::Optimized, FailurePolicy::default());
    let result = orch.execute(&def).await.unwrap();

    let step = result.step("slow").unwrap();
    assert_eq!(step.error_kind(), Some(StepErrorKind::Timeout));
    assert!(step.duration_ms < 2_000);
    let op = provenance
        .get_operation(step.operation_id.as_deref().unwrap())
        .unwrap();
    assert_eq!(op.success, Some(false));
    assert!(op.error_message.unwrap().contains("timed out"));
}

#[tokio::test]
async fn events_follow_run_lifecycle() {
    let (orch, _) = orchestrator(OptimizationLevel::Standard, FailurePolicy::default());
    let log = Arc::new(EventLog::default());
    orch.attach_observer(log.clone());

    orch.execute(&chain()).await.unwrap();
    let kinds = log.kinds();
    assert_eq!(kinds.first(), Some(&"run_started"));
    assert_eq!(kinds.last(), Some(&"run_completed"));
    assert_eq!(kinds.iter().filter(|k| **k == "step_completed").count(), 3);
    assert_eq!(kinds.iter().filter(|k| **k == "batch_started").count(), 3);

    assert!(orch.detach_observer("event-log"));
    orch.execute(&chain()).await.unwrap();
    assert_eq!(log.kinds().len(), kinds.len());
}

#[tokio::test]
async fn yaml_workflow_runs_end_to_end() {
    let def = WorkflowDefinition::from_yaml_str(
        r#"
name: yaml-run
phases:
  - name: ingest
    steps:
      - id: load
        tool: score
        inputs:
          confidence: 0.9
          title: "Annual report"
  - name: refine
    steps:
      - id: refine
        tool: score
        operation_type: refine
        inputs:
          heading: "Summary of ${load.title}"
outputs:
  expose:
    heading: "${refine.heading}"
"#,
    )
    .unwrap();

    let (orch, _) = orchestrator(OptimizationLevel::Enhanced, FailurePolicy::default());
    let result = orch.execute(&def).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.exposed["heading"], Value::from("Summary of Annual report"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn monitors_observe_partial_run() {
    use lineflow_core::monitor::{ErrorMonitor, ProgressMonitor};

    let def = WorkflowDefinition::new("monitored")
        .with_step(WorkflowStep::new("first", "fail"))
        .with_step(WorkflowStep::new("second", "fail"))
        .with_step(WorkflowStep::new("ok", "score"))
        .with_step(WorkflowStep::new("after", "score").depends_on("first"));

    let (orch, _) = orchestrator(OptimizationLevel::Optimized, FailurePolicy::default());
    let progress = Arc::new(ProgressMonitor::new());
    let errors = Arc::new(ErrorMonitor::new(2));
    orch.attach_observer(progress.clone());
    orch.attach_observer(errors.clone());

    orch.execute(&def).await.unwrap();

    let snapshot = progress.snapshot();
    assert!(!snapshot.is_active);
    assert_eq!(snapshot.total_steps, 4);
    assert_eq!(snapshot.completed, 1);
    assert_eq!(snapshot.failed, 2);
    assert_eq!(snapshot.skipped, 1);
    assert!((snapshot.percent - 100.0).abs() < 1e-9);

    assert_eq!(errors.total(), 2);
    let patterns = errors.repeated_patterns();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].tool_id, "fail");
    let mut steps = patterns[0].step_ids.clone();
    steps.sort();
    assert_eq!(steps, vec!["first".to_string(), "second".to_string()]);
}

#[tokio::test]
async fn slow_observer_does_not_stretch_step_timings() {
    use lineflow_core::monitor::{ExecutionEvent, ExecutionObserver};
    use std::time::Duration;

    struct Sluggish;

    impl ExecutionObserver for Sluggish {
        fn name(&self) -> &str {
            "sluggish"
        }

        fn on_event(&self, _event: &ExecutionEvent) {
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    let def = WorkflowDefinition::new("observed")
        .with_step(WorkflowStep::new("a", "score"))
        .with_step(WorkflowStep::new("b", "score").depends_on("a"));

    let (orch, _) = orchestrator(OptimizationLevel::Standard, FailurePolicy::default());
    let log = Arc::new(EventLog::default());
    orch.attach_observer(Arc::new(Sluggish));
    orch.attach_observer(log.clone());

    let result = orch.execute(&def).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Success);
    assert!(result.step("a").unwrap().duration_ms < 40);
    assert!(result.step("b").unwrap().duration_ms < 40);
    assert!(result.duration_ms < 150, "run took {}ms", result.duration_ms);

    // every event of the run has been delivered once execute returns
    assert_eq!(log.kinds().last(), Some(&"run_completed"));
}
