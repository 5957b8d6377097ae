//! Tool contract consumed by the engines.
//!
//! Every step dispatches through [`Tool::execute`] with a [`ToolRequest`] and gets back a
//! [`ToolResult`] envelope. Tools are looked up by id in a [`ToolRegistry`].

mod registry;
mod types;

pub use registry::ToolRegistry;
pub use types::{ExecutionHints, ToolRequest, ToolResult};

use async_trait::async_trait;

#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry key, referenced by `WorkflowStep::tool`.
    fn tool_id(&self) -> &str;

    /// Whether two invocations may run concurrently.
    fn supports_parallel(&self) -> bool {
        true
    }

    /// Run one invocation. `Err` is treated the same as a failed [`ToolResult`].
    async fn execute(&self, request: ToolRequest) -> anyhow::Result<ToolResult>;
}
