use async_trait::async_trait;
use serde_json::{Map, Value};

use lineflow_core::{Tool, ToolRequest, ToolResult};

use super::requested_confidence;

/// Deep-merges every object input, in input-name order.
pub struct MergeTool;

#[async_trait]
impl Tool for MergeTool {
    fn tool_id(&self) -> &str {
        "merge"
    }

    async fn execute(&self, request: ToolRequest) -> anyhow::Result<ToolResult> {
        let mut merged = Value::Object(Map::new());
        for (name, value) in &request.inputs {
            if name == "confidence" {
                continue;
            }
            if value.is_object() {
                deep_merge(&mut merged, value.clone());
            }
        }
        let mut result = ToolResult::ok(merged);
        result.confidence = requested_confidence(&request);
        Ok(result)
    }
}

/// Objects merge key by key, arrays concatenate, anything else is replaced by `incoming`.
pub fn deep_merge(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(incoming)) => base.extend(incoming),
        (base, incoming) => *base = incoming,
    }
}
