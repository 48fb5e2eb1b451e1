//! Tool descriptors and call results.
//!
//! A `Tool` is what discovery hands to callers: the name and description are
//! part of the contract (LLM-driven callers pick tools by them), and the
//! schemas are what lets a caller construct a valid invocation without prior
//! knowledge of the server.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::content::Content;

/// A discoverable tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for the argument object.
    pub input_schema: ToolSchema,

    /// JSON Schema for the (structured) result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: ToolSchema::empty(),
            output_schema: None,
        }
    }

    pub fn with_input_schema(mut self, schema: ToolSchema) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

/// The `type: "object"` schema wrapping a tool's parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub schema_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl ToolSchema {
    /// A schema with no parameters.
    pub fn empty() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: None,
            required: None,
        }
    }

    pub fn object(properties: Map<String, Value>, required: Vec<String>) -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: Some(properties),
            required: if required.is_empty() {
                None
            } else {
                Some(required)
            },
        }
    }
}

impl Default for ToolSchema {
    fn default() -> Self {
        Self::empty()
    }
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    /// A successful result: the structured value plus a text rendering of it.
    pub fn from_value(value: Value) -> Self {
        let text = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            content: vec![Content::text(text)],
            is_error: false,
            structured_content: Some(value),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
            structured_content: None,
        }
    }

    /// The structured value if present, otherwise the first text block.
    pub fn into_value(self) -> Value {
        if let Some(value) = self.structured_content {
            return value;
        }
        self.content
            .iter()
            .find_map(|c| c.as_text())
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null)
    }
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl ListToolsResult {
    pub fn all(tools: Vec<Tool>) -> Self {
        Self {
            tools,
            next_cursor: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_serializes_camel_case() {
        let tool = Tool::new("echo", "Echo a value back").with_input_schema(ToolSchema::object(
            {
                let mut props = Map::new();
                props.insert("value".to_string(), json!({"type": "string"}));
                props
            },
            vec!["value".to_string()],
        ));

        let json = serde_json::to_value(&tool).unwrap();
        assert_eq!(json["name"], "echo");
        assert_eq!(json["inputSchema"]["type"], "object");
        assert_eq!(json["inputSchema"]["required"][0], "value");
    }

    #[test]
    fn call_result_from_string_value() {
        let result = CallToolResult::from_value(json!("abc123"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["content"][0]["text"], "abc123");
        assert_eq!(json["structuredContent"], "abc123");
        assert!(json.get("isError").is_none());
    }

    #[test]
    fn call_result_error_flag() {
        let json = serde_json::to_value(CallToolResult::error("boom")).unwrap();
        assert_eq!(json["isError"], true);
    }

    #[test]
    fn into_value_prefers_structured_content() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "fallback"}],
            "structuredContent": {"hash": "ff"}
        }))
        .unwrap();
        assert_eq!(result.into_value(), json!({"hash": "ff"}));
    }

    #[test]
    fn into_value_falls_back_to_text() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "plain"}]
        }))
        .unwrap();
        assert_eq!(result.into_value(), json!("plain"));
    }
}
