//! HTTP endpoints for artifact exchange.
//!
//! This is the out-of-band channel for opaque image handles: callers upload
//! input images here, pass the returned hash to a generation tool, and fetch
//! output images back by the hash the tool returned.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::artifacts::ArtifactStore;

#[derive(Clone)]
pub struct WebState {
    pub store: ArtifactStore,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(serve_root))
        .route("/health", get(health))
        .route("/artifacts", post(upload_artifact))
        .route("/artifact/{hash}", get(download_artifact))
        .route("/artifact/{hash}/meta", get(artifact_meta))
        .with_state(state)
}

/// Root discovery document.
async fn serve_root() -> impl IntoResponse {
    Json(json!({
        "name": "atelier",
        "version": env!("CARGO_PKG_VERSION"),
        "links": {
            "mcp": "/mcp",
            "artifacts": "/artifacts",
            "health": "/health",
        }
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[tracing::instrument(skip_all)]
async fn upload_artifact(
    State(state): State<WebState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");

    match state.store.write(&body, mime_type) {
        Ok(hash) => {
            tracing::info!(artifact = %hash, size = body.len(), "artifact uploaded");
            (StatusCode::CREATED, Json(json!({ "hash": hash }))).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn download_artifact(
    State(state): State<WebState>,
    Path(hash): Path<String>,
) -> Response {
    match state.store.read(&hash) {
        Ok(Some(bytes)) => {
            let mime_type = state
                .store
                .inspect(&hash)
                .ok()
                .flatten()
                .map(|r| r.mime_type)
                .unwrap_or_else(|| "application/octet-stream".to_string());
            ([(header::CONTENT_TYPE, mime_type)], bytes).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "artifact not found").into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn artifact_meta(State(state): State<WebState>, Path(hash): Path<String>) -> Response {
    match state.store.inspect(&hash) {
        Ok(Some(reference)) => Json(reference).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "artifact not found").into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}
