use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionHints {
    pub timeout: Option<Duration>,
    pub parallel_eligible: bool,
}

/// Request envelope handed to a tool. `inputs` are already resolved.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub tool_id: String,
    pub step_id: String,
    pub execution_id: String,
    pub inputs: Map<String, Value>,
    pub hints: ExecutionHints,
}

impl ToolRequest {
    pub fn new(tool_id: impl Into<String>, inputs: Map<String, Value>) -> Self {
        Self {
            tool_id: tool_id.into(),
            step_id: String::new(),
            execution_id: String::new(),
            inputs,
            hints: ExecutionHints::default(),
        }
    }

    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    pub fn input_str(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ToolResult {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            confidence: None,
            metadata: Map::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            confidence: None,
            metadata: Map::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_result_has_error() {
        let result = ToolResult::failed("boom");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.output, Value::Null);
    }

    #[test]
    fn test_result_deserializes_minimal_envelope() {
        let result: ToolResult = serde_json::from_value(json!({"success": true})).unwrap();
        assert_eq!(result, ToolResult::ok(Value::Null));
    }

    #[test]
    fn test_request_input_accessors() {
        let mut inputs = Map::new();
        inputs.insert("text".into(), json!("hi"));
        inputs.insert("n".into(), json!(3));
        let req = ToolRequest::new("echo", inputs);
        assert_eq!(req.input_str("text"), Some("hi"));
        assert_eq!(req.input_str("n"), None);
        assert_eq!(req.input("n"), Some(&json!(3)));
    }
}
