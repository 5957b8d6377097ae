use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::step::{StepResult, StepStatus};
use crate::executor::graph::ExecutionPlan;
use crate::provenance::ProvenanceTrail;

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Partial,
    Failure,
}

impl ExecutionStatus {
    /// Every step succeeded (or there were none) is success; an aborted run or one where
    /// nothing succeeded is failure; anything else is partial.
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a StepResult>, aborted: bool) -> Self {
        let mut total = 0usize;
        let mut succeeded = 0usize;
        for result in results {
            total += 1;
            if result.success {
                succeeded += 1;
            }
        }

        if aborted {
            Self::Failure
        } else if succeeded == total {
            Self::Success
        } else if succeeded == 0 {
            Self::Failure
        } else {
            Self::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock batch time against the summed step time, per batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelStats {
    pub batches: usize,
    pub sum_step_ms: u64,
    pub wall_ms: u64,
    pub saved_ms: u64,
}

impl ParallelStats {
    pub fn record_batch(&mut self, sum_step_ms: u64, wall_ms: u64) {
        self.batches += 1;
        self.sum_step_ms += sum_step_ms;
        self.wall_ms += wall_ms;
        self.saved_ms += sum_step_ms.saturating_sub(wall_ms);
    }

    /// Fraction of summed step time saved by running concurrently.
    pub fn savings_ratio(&self) -> f64 {
        if self.sum_step_ms == 0 {
            0.0
        } else {
            self.saved_ms as f64 / self.sum_step_ms as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatistics {
    pub steps_dispatched: usize,
    pub peak_concurrency: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<ParallelStats>,
}

/// Unified result of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub workflow: String,
    pub engine: String,
    pub status: ExecutionStatus,
    pub results: BTreeMap<String, StepResult>,
    pub aggregated_output: Value,
    /// Values named by the workflow's `outputs.expose` section.
    #[serde(default)]
    pub exposed: Map<String, Value>,
    pub provenance: ProvenanceTrail,
    pub plan: ExecutionPlan,
    pub statistics: EngineStatistics,
    /// Provenance-store degradations that did not stop the run.
    #[serde(default)]
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn step(&self, step_id: &str) -> Option<&StepResult> {
        self.results.get(step_id)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.results.values().filter(|r| r.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(StepStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(StepStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(StepStatus::Skipped)
    }
}
