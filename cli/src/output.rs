//! Result rendering for `run`, `plan` and `provenance` commands.
use std::fmt::Write as _;

use serde::Serialize;

use lineflow_core::workflow::OutputFormat;
use lineflow_core::{ExecutionPlan, ExecutionResult, StepStatus};

pub fn render_structured<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Json | OutputFormat::Text => serde_json::to_string_pretty(value)?,
    })
}

pub fn render_result(result: &ExecutionResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Text => Ok(result_text(result)),
        other => render_structured(result, other),
    }
}

fn result_text(result: &ExecutionResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} [{}] {} in {}ms (engine {})",
        result.workflow,
        result.execution_id,
        result.status,
        result.duration_ms,
        result.engine
    );
    let _ = writeln!(
        out,
        "steps: {} succeeded, {} failed, {} skipped",
        result.succeeded(),
        result.failed(),
        result.skipped()
    );

    for step_id in result.plan.flatten() {
        let Some(step) = result.step(&step_id) else {
            continue;
        };
        let mark = match step.status {
            StepStatus::Succeeded => "ok  ",
            StepStatus::Failed => "FAIL",
            StepStatus::Skipped => "skip",
        };
        let _ = write!(out, "  {mark} {step_id} ({}, {}ms", step.tool_id, step.duration_ms);
        if let Some(c) = step.confidence {
            let _ = write!(out, ", confidence {c:.3}");
        }
        out.push(')');
        if let Some(err) = &step.error {
            let _ = write!(out, " {}: {}", err.kind, err.message);
        }
        out.push('\n');
    }

    if let Some(parallel) = &result.statistics.parallel {
        let _ = writeln!(
            out,
            "parallel: saved {}ms over {} batches ({:.0}%)",
            parallel.saved_ms,
            parallel.batches,
            parallel.savings_ratio() * 100.0
        );
    }
    if !result.exposed.is_empty() {
        out.push_str("outputs:\n");
        for (name, value) in &result.exposed {
            let _ = writeln!(out, "  {name} = {value}");
        }
    }
    for warning in &result.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }
    out
}

pub fn render_plan(plan: &ExecutionPlan, format: OutputFormat) -> anyhow::Result<String> {
    if format != OutputFormat::Text {
        return render_structured(plan, format);
    }
    let mut out = String::new();
    for (index, batch) in plan.batches.iter().enumerate() {
        let _ = writeln!(out, "batch {index}: {}", batch.join(", "));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineflow_core::executor::StepGraph;
    use lineflow_core::{WorkflowDefinition, WorkflowStep};

    #[test]
    fn test_plan_text_lists_batches() {
        let def = WorkflowDefinition::new("wf")
            .with_step(WorkflowStep::new("a", "echo"))
            .with_step(WorkflowStep::new("b", "echo"))
            .with_step(WorkflowStep::new("c", "echo").depends_on("a"));
        let plan = StepGraph::from_definition(&def).unwrap().resolve().unwrap();

        let text = render_plan(&plan, OutputFormat::Text).unwrap();
        assert_eq!(text, "batch 0: a, b\nbatch 1: c\n");

        let json: serde_json::Value =
            serde_json::from_str(&render_plan(&plan, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["batches"][1][0], "c");
    }
}
