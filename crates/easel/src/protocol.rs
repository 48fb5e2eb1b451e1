//! JSON-RPC method dispatch.
//!
//! Routes the handful of methods this server speaks onto the mounted tool
//! source. Tool-layer failures come back as structured `ErrorData` with the
//! failure kind preserved; they never take the process down.

use serde_json::{json, Value};

use crate::registry::ToolError;
use crate::transport::McpState;
use crate::types::error::ErrorData;
use crate::types::jsonrpc::JsonRpcMessage;
use crate::types::protocol::{InitializeParams, InitializeResult};
use crate::types::tool::{CallToolParams, CallToolResult, ListToolsResult};

/// Map a dispatch failure onto its JSON-RPC error payload.
pub fn rpc_error(error: &ToolError) -> ErrorData {
    let code = match error {
        ToolError::UnknownTool(_) => ErrorData::METHOD_NOT_FOUND,
        ToolError::InvalidArgument(_) => ErrorData::INVALID_PARAMS,
        _ => ErrorData::INTERNAL_ERROR,
    };
    ErrorData::new(code, error.to_string()).with_kind(error.kind())
}

/// Dispatch one request to its handler.
#[tracing::instrument(skip_all, fields(method = %message.method, session_id = %session_id))]
pub async fn dispatch(
    state: &McpState,
    session_id: &str,
    message: &JsonRpcMessage,
) -> Result<Value, ErrorData> {
    match message.method.as_str() {
        "initialize" => handle_initialize(state, session_id, message),
        "notifications/initialized" => Ok(Value::Null),
        "ping" => Ok(json!({})),
        "tools/list" => handle_list_tools(state),
        "tools/call" => handle_call_tool(state, message).await,
        other => Err(ErrorData::method_not_found(other)),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    message: &JsonRpcMessage,
    what: &str,
) -> Result<T, ErrorData> {
    message
        .params
        .as_ref()
        .map(|p| serde_json::from_value(p.clone()))
        .transpose()
        .map_err(|e| ErrorData::invalid_params(format!("Invalid {} params: {}", what, e)))?
        .ok_or_else(|| ErrorData::invalid_params(format!("Missing {} params", what)))
}

fn handle_initialize(
    state: &McpState,
    session_id: &str,
    message: &JsonRpcMessage,
) -> Result<Value, ErrorData> {
    let params: InitializeParams = parse_params(message, "initialize")?;
    state.sessions.set_initialized(session_id, params.client_info);

    let mut result = InitializeResult::new(state.server_info.clone());
    if let Some(instructions) = &state.instructions {
        result = result.with_instructions(instructions.clone());
    }
    serde_json::to_value(&result)
        .map_err(|e| ErrorData::internal_error(format!("Failed to serialize result: {}", e)))
}

fn handle_list_tools(state: &McpState) -> Result<Value, ErrorData> {
    let result = ListToolsResult::all(state.source.tools());
    serde_json::to_value(&result)
        .map_err(|e| ErrorData::internal_error(format!("Failed to serialize result: {}", e)))
}

async fn handle_call_tool(state: &McpState, message: &JsonRpcMessage) -> Result<Value, ErrorData> {
    let params: CallToolParams = parse_params(message, "call")?;
    let arguments = params.arguments.unwrap_or_default();

    let value = state
        .source
        .invoke(&params.name, arguments)
        .await
        .map_err(|e| {
            tracing::warn!(tool = %params.name, error = %e, "tool call failed");
            rpc_error(&e)
        })?;

    serde_json::to_value(CallToolResult::from_value(value))
        .map_err(|e| ErrorData::internal_error(format!("Failed to serialize result: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Registry, ToolDef};
    use crate::schema::{ParamSpec, ValueSchema};
    use std::sync::Arc;

    fn test_state() -> McpState {
        let mut registry = Registry::new("test");
        registry
            .register(
                ToolDef::new("greet", "Greet someone by name", ValueSchema::String, |args| {
                    async move {
                        let name = args["name"].as_str().unwrap_or("nobody");
                        Ok(json!(format!("hello {}", name)))
                    }
                })
                .param(ParamSpec::new("name", ValueSchema::String)),
            )
            .unwrap();
        McpState::new(Arc::new(registry), "test-server", "0.0.0")
    }

    fn request(method: &str, params: Value) -> JsonRpcMessage {
        JsonRpcMessage::request(1, method, params)
    }

    #[tokio::test]
    async fn initialize_returns_server_info() {
        let state = test_state();
        let session = state.sessions.get_or_create(None);
        let result = dispatch(
            &state,
            &session,
            &request(
                "initialize",
                json!({
                    "protocolVersion": "2025-06-18",
                    "capabilities": {},
                    "clientInfo": {"name": "client", "version": "1.0"},
                }),
            ),
        )
        .await
        .unwrap();
        assert_eq!(result["serverInfo"]["name"], "test-server");
    }

    #[tokio::test]
    async fn list_tools_includes_schema() {
        let state = test_state();
        let result = dispatch(&state, "s", &request("tools/list", json!({})))
            .await
            .unwrap();
        assert_eq!(result["tools"][0]["name"], "greet");
        assert_eq!(
            result["tools"][0]["inputSchema"]["properties"]["name"]["type"],
            "string"
        );
    }

    #[tokio::test]
    async fn call_tool_wraps_value() {
        let state = test_state();
        let result = dispatch(
            &state,
            "s",
            &request("tools/call", json!({"name": "greet", "arguments": {"name": "ada"}})),
        )
        .await
        .unwrap();
        assert_eq!(result["structuredContent"], "hello ada");
        assert_eq!(result["content"][0]["text"], "hello ada");
    }

    #[tokio::test]
    async fn invalid_argument_keeps_kind() {
        let state = test_state();
        let err = dispatch(
            &state,
            "s",
            &request("tools/call", json!({"name": "greet", "arguments": {"nope": 1}})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorData::INVALID_PARAMS);
        assert_eq!(err.data.unwrap()["kind"], "invalid_argument");
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let state = test_state();
        let err = dispatch(
            &state,
            "s",
            &request("tools/call", json!({"name": "absent", "arguments": {}})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorData::METHOD_NOT_FOUND);
        assert_eq!(err.data.unwrap()["kind"], "unknown_tool");
    }

    #[tokio::test]
    async fn unknown_method_rejected() {
        let state = test_state();
        let err = dispatch(&state, "s", &request("resources/list", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorData::METHOD_NOT_FOUND);
    }
}
