use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DERIVED_FROM: &str = "derived_from";

/// One recorded tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: String,
    pub tool_id: String,
    pub operation_type: String,
    pub inputs: Value,
    pub outputs: Value,
    pub parameters: Map<String, Value>,
    /// `None` until completed.
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub metadata: Map<String, Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl Operation {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Milliseconds between two timestamps, never negative.
pub fn duration_between(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> i64 {
    (completed_at - started_at).num_milliseconds().max(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub source_operation_id: String,
    pub target_operation_id: String,
    pub relationship_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineageDirection {
    /// Edges whose target is the operation.
    Upstream,
    /// Edges whose source is the operation.
    Downstream,
    Both,
}

impl LineageDirection {
    pub fn includes_upstream(&self) -> bool {
        matches!(self, Self::Upstream | Self::Both)
    }

    pub fn includes_downstream(&self) -> bool {
        matches!(self, Self::Downstream | Self::Both)
    }
}

impl fmt::Display for LineageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
            Self::Both => "both",
        })
    }
}

impl FromStr for LineageDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upstream" | "up" => Ok(Self::Upstream),
            "downstream" | "down" => Ok(Self::Downstream),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown lineage direction '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceStatistics {
    pub total_operations: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Started but not yet completed.
    pub pending_count: usize,
    pub per_tool_counts: BTreeMap<String, usize>,
    /// Mean over completed operations, milliseconds.
    pub average_duration_ms: f64,
    pub lineage_edges: usize,
}

/// The slice of provenance produced by one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceTrail {
    pub operations: Vec<Operation>,
    pub lineage: Vec<LineageEdge>,
}

impl ProvenanceTrail {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.lineage.is_empty()
    }
}
