//! Result aggregation: step results in, one workflow-level value out.
//!
//! Aggregators are pure. They walk results in step-id order, so the output does not
//! depend on completion order and re-aggregating the same map gives the same value.

mod graph;
mod simple;

pub use graph::GraphAggregator;
pub use simple::SimpleAggregator;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::OrchestratorError;
use crate::executor::StepResult;
use crate::workflow::{AggregatorKind, OutputSpec};

pub trait ResultAggregator: Send + Sync {
    fn name(&self) -> &str;

    fn aggregate(&self, results: &BTreeMap<String, StepResult>) -> Result<Value, OrchestratorError>;
}

/// The aggregator an output section asks for.
pub fn aggregator_for(spec: &OutputSpec) -> Box<dyn ResultAggregator> {
    match spec.aggregator {
        AggregatorKind::Simple => Box::new(SimpleAggregator),
        AggregatorKind::Graph => Box::new(GraphAggregator::new(
            spec.node_key.clone(),
            spec.edge_keys.clone(),
        )),
    }
}
