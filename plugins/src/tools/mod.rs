//! Built-in tools. Each one is a plain struct registered by id in
//! [`crate::factory::build_tool_registry`].

mod basic;
mod graph;
mod merge;
mod template;

pub use basic::{DelayTool, EchoTool, FailTool};
pub use graph::GraphTool;
pub use merge::{deep_merge, MergeTool};
pub use template::{render_template, TemplateTool};

use serde_json::Value;

use lineflow_core::ToolRequest;

/// Optional `confidence` input, forwarded as the tool's own confidence.
pub(crate) fn requested_confidence(request: &ToolRequest) -> Option<f64> {
    request.input("confidence").and_then(Value::as_f64)
}
