use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use lineflow_core::{Tool, ToolRequest, ToolResult};

use super::requested_confidence;

/// Returns its resolved inputs unchanged.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn tool_id(&self) -> &str {
        "echo"
    }

    async fn execute(&self, request: ToolRequest) -> anyhow::Result<ToolResult> {
        let confidence = requested_confidence(&request);
        let mut result = ToolResult::ok(Value::Object(request.inputs));
        result.confidence = confidence;
        Ok(result)
    }
}

/// Always fails. `message` overrides the error text.
pub struct FailTool;

#[async_trait]
impl Tool for FailTool {
    fn tool_id(&self) -> &str {
        "fail"
    }

    async fn execute(&self, request: ToolRequest) -> anyhow::Result<ToolResult> {
        let message = request
            .input_str("message")
            .map(str::to_string)
            .unwrap_or_else(|| format!("step '{}' failed as requested", request.step_id));
        Ok(ToolResult::failed(message))
    }
}

/// Sleeps for `ms` milliseconds, then echoes its inputs.
pub struct DelayTool;

#[async_trait]
impl Tool for DelayTool {
    fn tool_id(&self) -> &str {
        "delay"
    }

    async fn execute(&self, request: ToolRequest) -> anyhow::Result<ToolResult> {
        let ms = match request.input("ms") {
            None => 0,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| anyhow::anyhow!("'ms' must be a non-negative integer, got {v}"))?,
        };
        tokio::time::sleep(Duration::from_millis(ms)).await;
        let confidence = requested_confidence(&request);
        let mut result = ToolResult::ok(Value::Object(request.inputs));
        result.confidence = confidence;
        Ok(result)
    }
}
