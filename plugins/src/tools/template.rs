use async_trait::async_trait;
use serde_json::{json, Map, Value};

use lineflow_core::{Tool, ToolRequest, ToolResult};

use super::requested_confidence;

/// Renders the `text` input, replacing `{{name}}` with the input called `name`.
///
/// Output: `{ "text": <rendered>, "missing": [<unbound names>] }`.
pub struct TemplateTool;

#[async_trait]
impl Tool for TemplateTool {
    fn tool_id(&self) -> &str {
        "template"
    }

    async fn execute(&self, request: ToolRequest) -> anyhow::Result<ToolResult> {
        let Some(text) = request.input_str("text") else {
            return Ok(ToolResult::failed("template requires a string 'text' input"));
        };
        let (rendered, missing) = render_template(text, &request.inputs);
        let mut result = ToolResult::ok(json!({ "text": rendered, "missing": missing }));
        result.confidence = requested_confidence(&request);
        Ok(result)
    }
}

/// Substitute `{{name}}` placeholders. Unbound names render as empty and are reported.
pub fn render_template(text: &str, vars: &Map<String, Value>) -> (String, Vec<String>) {
    let mut out = String::with_capacity(text.len());
    let mut missing = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            rest = "";
            break;
        };
        let name = after[..close].trim();
        match vars.get(name) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
            }
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    (out, missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_render_substitutes_values() {
        let (text, missing) = render_template(
            "{{ who }} wrote {{count}} notes",
            &vars(json!({"who": "Ada", "count": 3})),
        );
        assert_eq!(text, "Ada wrote 3 notes");
        assert!(missing.is_empty());
    }

    #[test]
    fn test_render_reports_missing_once() {
        let (text, missing) = render_template("{{x}}-{{x}}-{{y", &Map::new());
        assert_eq!(text, "--{{y");
        assert_eq!(missing, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_template_tool_requires_text() {
        let result = TemplateTool
            .execute(ToolRequest::new("template", Map::new()))
            .await
            .unwrap();
        assert!(!result.success);
    }
}
