use std::collections::{BTreeMap, HashMap};

use serde_json::{json, Map, Value};
use tracing::debug;

use super::ResultAggregator;
use crate::error::OrchestratorError;
use crate::executor::{StepResult, StepStatus};

/// Merges `{ nodes: [..], edges: [..] }` fragments from several steps into one graph.
///
/// Nodes are identified by the JSON value of `node_key`, edges by the tuple of `edge_keys`. A duplicate is
/// merged field-wise: new fields are added, and on a conflicting value the first writer
/// (in step-id order) is kept and the conflict counted. Successful outputs that are not
/// objects, or carry neither `nodes` nor `edges`, do not contribute.
#[derive(Debug, Clone)]
pub struct GraphAggregator {
    node_key: String,
    edge_keys: Vec<String>,
}

impl Default for GraphAggregator {
    fn default() -> Self {
        Self::new(
            "id".to_string(),
            vec!["source".to_string(), "target".to_string(), "type".to_string()],
        )
    }
}

#[derive(Default)]
struct Merged {
    items: Vec<Map<String, Value>>,
    index: HashMap<String, usize>,
    duplicates: usize,
    conflicts: usize,
}

impl Merged {
    fn insert(&mut self, key: String, item: Map<String, Value>) {
        let Some(&at) = self.index.get(&key) else {
            self.index.insert(key, self.items.len());
            self.items.push(item);
            return;
        };

        self.duplicates += 1;
        let existing = &mut self.items[at];
        for (field, value) in item {
            match existing.get(&field) {
                None => {
                    existing.insert(field, value);
                }
                Some(current) if *current == value => {}
                Some(_) => self.conflicts += 1,
            }
        }
    }
}

impl GraphAggregator {
    pub fn new(node_key: String, edge_keys: Vec<String>) -> Self {
        Self {
            node_key,
            edge_keys,
        }
    }

    fn node_identity(&self, step_id: &str, node: &Map<String, Value>) -> Result<String, OrchestratorError> {
        match node.get(&self.node_key) {
            Some(Value::Null) | None => Err(OrchestratorError::Aggregation(format!(
                "step '{step_id}': node without '{}' key",
                self.node_key
            ))),
            // keyed by serialized JSON, so "1" and 1 stay distinct nodes
            Some(value) => Ok(value.to_string()),
        }
    }

    fn edge_identity(&self, edge: &Map<String, Value>) -> String {
        let parts: Vec<Value> = self
            .edge_keys
            .iter()
            .map(|k| edge.get(k).cloned().unwrap_or(Value::Null))
            .collect();
        Value::Array(parts).to_string()
    }
}

fn objects<'a>(
    step_id: &str,
    field: &str,
    value: Option<&'a Value>,
) -> Result<Vec<&'a Map<String, Value>>, OrchestratorError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let Value::Array(items) = value else {
        return Err(OrchestratorError::Aggregation(format!(
            "step '{step_id}': '{field}' must be an array"
        )));
    };
    items
        .iter()
        .map(|item| {
            item.as_object().ok_or_else(|| {
                OrchestratorError::Aggregation(format!(
                    "step '{step_id}': every entry of '{field}' must be an object"
                ))
            })
        })
        .collect()
}

impl ResultAggregator for GraphAggregator {
    fn name(&self) -> &str {
        "graph"
    }

    fn aggregate(&self, results: &BTreeMap<String, StepResult>) -> Result<Value, OrchestratorError> {
        let mut nodes = Merged::default();
        let mut edges = Merged::default();
        let mut sources = Vec::new();

        for (step_id, result) in results {
            if result.status != StepStatus::Succeeded {
                continue;
            }
            let Some(output) = result.output.as_object() else {
                continue;
            };
            if !output.contains_key("nodes") && !output.contains_key("edges") {
                continue;
            }

            for node in objects(step_id, "nodes", output.get("nodes"))? {
                let key = self.node_identity(step_id, node)?;
                nodes.insert(key, node.clone());
            }
            for edge in objects(step_id, "edges", output.get("edges"))? {
                edges.insert(self.edge_identity(edge), edge.clone());
            }
            sources.push(step_id.clone());
        }

        debug!(
            nodes = nodes.items.len(),
            edges = edges.items.len(),
            conflicts = nodes.conflicts + edges.conflicts,
            "graph aggregated"
        );

        Ok(json!({
            "nodes": nodes.items,
            "edges": edges.items,
            "stats": {
                "node_count": nodes.items.len(),
                "edge_count": edges.items.len(),
                "merged_nodes": nodes.duplicates,
                "merged_edges": edges.duplicates,
                "conflicts": nodes.conflicts + edges.conflicts,
                "sources": sources,
            },
        }))
    }
}
