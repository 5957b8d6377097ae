use async_trait::async_trait;
use serde_json::{json, Value};

use lineflow_core::{Tool, ToolRequest, ToolResult};

use super::requested_confidence;

/// Emits a `{nodes, edges}` fragment for the graph aggregator.
///
/// `nodes` / `edges` inputs are taken as-is; an `entities` array of strings adds
/// `{ "id": <name>, "type": "entity" }` nodes.
pub struct GraphTool;

#[async_trait]
impl Tool for GraphTool {
    fn tool_id(&self) -> &str {
        "graph"
    }

    async fn execute(&self, request: ToolRequest) -> anyhow::Result<ToolResult> {
        let mut nodes = match array_input(&request, "nodes") {
            Ok(v) => v,
            Err(msg) => return Ok(ToolResult::failed(msg)),
        };
        let edges = match array_input(&request, "edges") {
            Ok(v) => v,
            Err(msg) => return Ok(ToolResult::failed(msg)),
        };
        let entities = match array_input(&request, "entities") {
            Ok(v) => v,
            Err(msg) => return Ok(ToolResult::failed(msg)),
        };
        for entity in entities {
            match entity {
                Value::String(name) => nodes.push(json!({"id": name, "type": "entity"})),
                other => {
                    return Ok(ToolResult::failed(format!(
                        "entities must be strings, got {other}"
                    )))
                }
            }
        }

        let mut result = ToolResult::ok(json!({ "nodes": nodes, "edges": edges }));
        result.confidence = requested_confidence(&request);
        Ok(result)
    }
}

fn array_input(request: &ToolRequest, name: &str) -> Result<Vec<Value>, String> {
    match request.input(name) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(format!("'{name}' must be an array, got {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(v: Value) -> ToolRequest {
        ToolRequest::new("graph", v.as_object().cloned().unwrap())
    }

    #[tokio::test]
    async fn test_graph_from_entities() {
        let result = GraphTool
            .execute(request(json!({
                "entities": ["ada", "london"],
                "edges": [{"source": "ada", "target": "london", "type": "lived_in"}]
            })))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output["nodes"][1]["id"], "london");
        assert_eq!(result.output["edges"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_graph_rejects_non_array() {
        let result = GraphTool.execute(request(json!({"nodes": 5}))).await.unwrap();
        assert!(!result.success);
    }
}
