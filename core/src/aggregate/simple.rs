use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use super::ResultAggregator;
use crate::error::OrchestratorError;
use crate::executor::{StepResult, StepStatus};

/// Flat consolidation for linear pipelines:
///
/// ```json
/// { "steps": { "<id>": <output> }, "failed": [..], "skipped": [..],
///   "summary": { "total": 0, "succeeded": 0, "failed": 0, "skipped": 0 } }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleAggregator;

impl ResultAggregator for SimpleAggregator {
    fn name(&self) -> &str {
        "simple"
    }

    fn aggregate(&self, results: &BTreeMap<String, StepResult>) -> Result<Value, OrchestratorError> {
        let mut steps = Map::new();
        let mut failed = Vec::new();
        let mut skipped = Vec::new();

        for (step_id, result) in results {
            match result.status {
                StepStatus::Succeeded => {
                    steps.insert(step_id.clone(), result.output.clone());
                }
                StepStatus::Failed => failed.push(step_id.clone()),
                StepStatus::Skipped => skipped.push(step_id.clone()),
            }
        }

        Ok(json!({
            "summary": {
                "total": results.len(),
                "succeeded": steps.len(),
                "failed": failed.len(),
                "skipped": skipped.len(),
            },
            "steps": steps,
            "failed": failed,
            "skipped": skipped,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{StepError, StepErrorKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_map_gives_empty_structure() {
        let out = SimpleAggregator.aggregate(&BTreeMap::new()).unwrap();
        assert_eq!(
            out,
            json!({
                "summary": {"total": 0, "succeeded": 0, "failed": 0, "skipped": 0},
                "steps": {},
                "failed": [],
                "skipped": [],
            })
        );
    }

    #[test]
    fn test_partitions_by_status() {
        let mut results = BTreeMap::new();
        results.insert("b".to_string(), StepResult::succeeded("b", "echo", json!(2)));
        results.insert("a".to_string(), StepResult::succeeded("a", "echo", json!(1)));
        results.insert(
            "c".to_string(),
            StepResult::failed("c", "fail", StepError::new(StepErrorKind::ToolFailed, "x")),
        );
        results.insert(
            "d".to_string(),
            StepResult::skipped("d", "echo", StepError::upstream_failed("c")),
        );

        let out = SimpleAggregator.aggregate(&results).unwrap();
        assert_eq!(out["steps"], json!({"a": 1, "b": 2}));
        assert_eq!(out["failed"], json!(["c"]));
        assert_eq!(out["skipped"], json!(["d"]));
        assert_eq!(out["summary"]["total"], json!(4));

        // idempotent
        assert_eq!(SimpleAggregator.aggregate(&results).unwrap(), out);
    }
}
