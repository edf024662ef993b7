//! JSON-RPC-flavored HTTP dispatcher (§4.9, Component I).
//!
//! Exposes the same `ToolEnvelope` (G) the stdio dispatcher uses through a
//! small set of REST endpoints. There is no separate execution path: every
//! handler ends up calling `ToolEnvelope::call`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::protocol::{InitializeParams, InitializeResult, ServerInfo, ToolCallParams, PROTOCOL_VERSION};
use crate::tool::ToolEnvelope;

pub struct HttpState {
    envelope: Arc<ToolEnvelope>,
    initialized: AtomicBool,
}

/// Build the router (§4.9's endpoint table). Read/write timeouts are 30s;
/// idle connections are reaped after 120s by the caller's `axum::serve`
/// `TcpListener` accept loop.
pub fn router(envelope: Arc<ToolEnvelope>) -> Router {
    let state = Arc::new(HttpState {
        envelope,
        initialized: AtomicBool::new(false),
    });

    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/mcp/initialize", post(initialize))
        .route("/mcp/tools/list", get(list_tools))
        .route("/mcp/tools/call", post(call_tool))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

async fn banner(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let tools = state.envelope.list_tools();
    Json(json!({
        "name": "browservisor",
        "version": env!("CARGO_PKG_VERSION"),
        "tool_count": tools.len(),
        "endpoints": [
            "/health",
            "/mcp/initialize",
            "/mcp/tools/list",
            "/mcp/tools/call",
        ],
    }))
}

async fn health(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "tools": state.envelope.list_tools().len(),
        "initialized": state.initialized.load(Ordering::SeqCst),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn initialize(
    State(state): State<Arc<HttpState>>,
    Json(params): Json<InitializeParams>,
) -> impl IntoResponse {
    state.initialized.store(true, Ordering::SeqCst);
    let result = InitializeResult {
        protocol_version: if params.protocol_version.is_empty() {
            PROTOCOL_VERSION.to_string()
        } else {
            params.protocol_version
        },
        capabilities: json!({"tools": {}}),
        server_info: ServerInfo {
            name: "browservisor".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };
    Json(result)
}

async fn list_tools(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(json!({"tools": state.envelope.list_tools()}))
}

async fn call_tool(
    State(state): State<Arc<HttpState>>,
    Json(params): Json<ToolCallParams>,
) -> impl IntoResponse {
    match state.envelope.call(&params.name, params.arguments).await {
        Ok(result) => (StatusCode::OK, Json(serde_json::to_value(result).unwrap_or(serde_json::Value::Null))),
        Err(err) => match err.to_protocol_error() {
            Some((code, message)) => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": {"code": code, "message": message}})),
            ),
            None => (
                StatusCode::OK,
                Json(serde_json::to_value(crate::protocol::ToolResult::error(err.to_string()))
                    .unwrap_or(serde_json::Value::Null)),
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakers;
    use crate::tool::ToolRegistry;
    use tower::ServiceExt;

    fn empty_router() -> Router {
        let registry = Arc::new(ToolRegistry::new());
        let envelope = Arc::new(ToolEnvelope::new(registry, Arc::new(CircuitBreakers::default())));
        router(envelope)
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let app = empty_router();
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn tools_list_returns_empty_array_for_fresh_registry() {
        let app = empty_router();
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/mcp/tools/list")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["tools"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn unknown_tool_call_is_not_found() {
        let app = empty_router();
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/mcp/tools/call")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(
                        serde_json::json!({"name": "nope", "arguments": {}}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
