//! Type conversions between [`dawn_agent`]'s tool types and rmcp's MCP
//! model types. Pure, stateless functions. An agent's tool handler here
//! returns a raw `serde_json::Value`, so a successful call becomes a
//! single text content block (pretty JSON unless the value is already a
//! plain string).

use std::sync::Arc;

use dawn_agent::{AgentError, ToolSpec};
use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::Value;

pub fn tool_spec_to_mcp_tool(spec: ToolSpec) -> rmcp::model::Tool {
    let input_schema: JsonObject = value_to_object(spec.input_schema);
    rmcp::model::Tool::new(
        std::borrow::Cow::Owned(spec.name),
        std::borrow::Cow::Owned(spec.description),
        Arc::new(input_schema),
    )
}

/// MCP requires the schema to be a JSON object; if the provided value is
/// already an object we use it directly, otherwise we wrap it in a minimal
/// `{"type":"object"}` envelope.
fn value_to_object(v: Value) -> JsonObject {
    use serde_json::Map;
    match v {
        Value::Object(m) => m,
        other => {
            let mut m = Map::new();
            m.insert("type".to_string(), Value::String("object".to_string()));
            m.insert("value".to_string(), other);
            m
        }
    }
}

/// Convert a tool call's outcome into an rmcp [`CallToolResult`]. String
/// results are passed through verbatim; any other JSON value is rendered
/// as pretty-printed text so the caller still gets something readable.
pub fn result_to_call_result(result: Result<Value, AgentError>) -> CallToolResult {
    match result {
        Ok(value) => CallToolResult::success(vec![Content::text(value_to_text(&value))]),
        Err(err) => CallToolResult {
            content: vec![Content::text(err.to_string())],
            is_error: Some(true),
            structured_content: None,
            meta: None,
        },
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_spec_preserves_name_and_description() {
        let spec = ToolSpec {
            name: "echo".into(),
            description: "echoes input".into(),
            input_schema: json!({"type": "object"}),
        };
        let tool = tool_spec_to_mcp_tool(spec);
        assert_eq!(tool.name.as_ref(), "echo");
        assert_eq!(tool.description.as_deref(), Some("echoes input"));
    }

    #[test]
    fn non_object_schema_gets_wrapped() {
        let spec = ToolSpec {
            name: "echo".into(),
            description: "".into(),
            input_schema: json!("not an object"),
        };
        let tool = tool_spec_to_mcp_tool(spec);
        assert_eq!(
            tool.input_schema.get("type"),
            Some(&Value::String("object".to_string()))
        );
    }

    #[test]
    fn ok_string_result_passes_through_verbatim() {
        let result = result_to_call_result(Ok(json!("hello")));
        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.content.len(), 1);
    }

    #[test]
    fn ok_object_result_is_pretty_printed() {
        let result = result_to_call_result(Ok(json!({"a": 1})));
        assert_eq!(result.is_error, Some(false));
    }

    #[test]
    fn err_result_sets_is_error() {
        let result = result_to_call_result(Err(AgentError::ToolNotFound("x".into())));
        assert_eq!(result.is_error, Some(true));
    }
}
