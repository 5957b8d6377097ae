use std::path::PathBuf;

use serde_json::json;

use lineflow_core::executor::StepErrorKind;
use lineflow_core::{
    AppConfig, ExecutionStatus, FailurePolicy, OptimizationLevel, Orchestrator, ServicesFactory,
    WorkflowDefinition,
};
use lineflow_plugins::services::BuiltinServicesFactory;

fn demo(name: &str) -> WorkflowDefinition {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("demos")
        .join(name);
    WorkflowDefinition::from_path(&path).unwrap()
}

async fn orchestrator(level: OptimizationLevel, policy: FailurePolicy) -> Orchestrator {
    let mut cfg = AppConfig::default();
    cfg.orchestrator.optimization_level = level;
    cfg.orchestrator.failure_policy = policy;
    let services = BuiltinServicesFactory.build_services(&cfg).await.unwrap();
    Orchestrator::builder(cfg).services(services).build().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn knowledge_graph_demo_merges_fragments() {
    let def = demo("knowledge_graph.yaml");
    for level in OptimizationLevel::all() {
        let result = orchestrator(level, FailurePolicy::default())
            .await
            .execute(&def)
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Success, "{level}");
        let graph = &result.aggregated_output;
        assert_eq!(graph["stats"]["node_count"], json!(3));
        assert_eq!(graph["stats"]["edge_count"], json!(2));
        assert_eq!(graph["stats"]["merged_nodes"], json!(1));
        assert_eq!(
            result.exposed["headline"],
            json!("Notes on Ada Lovelace: 2 people found")
        );

        let summary = result.step("summary").unwrap().confidence.unwrap();
        assert!(summary > 0.0 && summary < 0.95);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failure_drill_skips_only_dependents() {
    let def = demo("drill_failures.json");
    let result = orchestrator(OptimizationLevel::Optimized, FailurePolicy::SkipDependents)
        .await
        .execute(&def)
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Partial);
    assert_eq!(
        result.step("combine").unwrap().error_kind(),
        Some(StepErrorKind::UpstreamFailed)
    );
    assert_eq!(result.step("report").unwrap().output["text"], json!("rows=3"));
}
