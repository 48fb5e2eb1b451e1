//! Streamable HTTP transport.
//!
//! - `POST /` — send a JSON-RPC request, receive the response directly
//! - `DELETE /` — terminate the session
//! - Session id travels in the `Mcp-Session-Id` header both ways

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::Value;

use crate::composite::ToolSource;
use crate::session::{InMemorySessionStore, SessionStore};
use crate::types::error::ErrorData;
use crate::types::jsonrpc::{JsonRpcMessage, JsonRpcReply};
use crate::types::protocol::Implementation;

pub const SESSION_HEADER: &str = "mcp-session-id";

/// Shared state for the MCP handlers: the mounted tool source plus sessions
/// and identity.
pub struct McpState {
    pub source: Arc<dyn ToolSource>,
    pub sessions: Arc<dyn SessionStore>,
    pub server_info: Implementation,
    pub instructions: Option<String>,
}

impl McpState {
    pub fn new(
        source: Arc<dyn ToolSource>,
        server_name: impl Into<String>,
        server_version: impl Into<String>,
    ) -> Self {
        Self {
            source,
            sessions: InMemorySessionStore::new_shared(),
            server_info: Implementation::new(server_name, server_version),
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }
}

/// Handle a streamable HTTP request.
#[tracing::instrument(skip_all, fields(session_id = tracing::field::Empty))]
pub async fn streamable_handler(
    State(state): State<Arc<McpState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let hint = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let session_id = state.sessions.get_or_create(hint.as_deref());
    tracing::Span::current().record("session_id", session_id.as_str());
    state.sessions.touch(&session_id);

    // Keep the request id around for error responses; null for notifications.
    let request_id = body.get("id").cloned().unwrap_or(Value::Null);

    let message: JsonRpcMessage = match serde_json::from_value(body) {
        Ok(m) => m,
        Err(e) => {
            let reply = JsonRpcReply::failure(
                request_id,
                ErrorData::parse_error(format!("Invalid JSON-RPC: {}", e)),
            );
            return with_session(StatusCode::BAD_REQUEST, &session_id, Json(reply).into_response());
        }
    };

    if message.is_notification() {
        tracing::debug!(method = %message.method, "notification received");
        return with_session(StatusCode::ACCEPTED, &session_id, ().into_response());
    }

    let reply = match crate::protocol::dispatch(&state, &session_id, &message).await {
        Ok(result) => JsonRpcReply::success(request_id, result),
        Err(error) => JsonRpcReply::failure(request_id, error),
    };

    with_session(StatusCode::OK, &session_id, Json(reply).into_response())
}

/// Handle session termination.
#[tracing::instrument(skip_all)]
pub async fn delete_handler(
    State(state): State<Arc<McpState>>,
    headers: HeaderMap,
) -> Response {
    let session_id = match headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        Some(id) => id.to_string(),
        None => {
            return (StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header").into_response();
        }
    };

    state.sessions.remove(&session_id);
    tracing::info!(session_id = %session_id, "session terminated");
    StatusCode::NO_CONTENT.into_response()
}

fn with_session(status: StatusCode, session_id: &str, mut response: Response) -> Response {
    *response.status_mut() = status;
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

/// Build the streamable HTTP router. Mount wherever the deployment wants the
/// MCP endpoint to live (the atelier server nests it at `/mcp`).
pub fn streamable_router(state: Arc<McpState>) -> Router {
    Router::new()
        .route(
            "/",
            axum::routing::post(streamable_handler).delete(delete_handler),
        )
        .with_state(state)
}
