//! End-to-end scenarios over the HTTP dispatcher and the path-validated file
//! tools (§8), using a real `tower::ServiceExt::oneshot` call against the
//! router rather than a bound `TcpListener`.

use std::ops::Not;
use std::path::PathBuf;
use std::sync::Arc;

use browservisor::circuit_breaker::CircuitBreakers;
use browservisor::dispatcher::http_router;
use browservisor::path_validator::PathPolicy;
use browservisor::tool::{ToolEnvelope, ToolRegistry};
use browservisor::tools::{ReadFileTool, WriteFileTool};
use tower::ServiceExt;

fn router_with_file_tools(policy: PathPolicy) -> axum::Router {
    let registry = Arc::new(ToolRegistry::new());
    let policy = Arc::new(policy);
    registry.register(Arc::new(ReadFileTool::new(policy.clone())));
    registry.register(Arc::new(WriteFileTool::new(policy)));
    let envelope = Arc::new(ToolEnvelope::new(registry, Arc::new(CircuitBreakers::default())));
    http_router(envelope)
}

/// Scenario 5: a write outside the allow list is rejected by the policy and
/// surfaces as a tool-level error, not a panic or protocol error.
#[tokio::test]
async fn write_outside_allow_list_is_denied_over_http() {
    let tmp = tempfile::tempdir().unwrap();
    let mut policy = PathPolicy::new(tmp.path().to_path_buf());
    policy.allowed_paths = vec![tmp.path().to_path_buf()];
    policy.restrict_to_working_dir = false;

    let app = router_with_file_tools(policy);
    let outside = PathBuf::from("/etc/definitely-not-allowed.txt");

    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/mcp/tools/call")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(
                    serde_json::json!({
                        "name": "write_file",
                        "arguments": {"path": outside.to_string_lossy(), "content": "nope"}
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["isError"], true);
    assert!(tmp.path().join("definitely-not-allowed.txt").exists().not());
}

/// A write inside the allow list followed by a read round-trips the
/// content, exercising both tools through the same router a real client
/// would talk to.
#[tokio::test]
async fn write_then_read_round_trips_over_http() {
    let tmp = tempfile::tempdir().unwrap();
    let mut policy = PathPolicy::new(tmp.path().to_path_buf());
    policy.allowed_paths = vec![tmp.path().to_path_buf()];
    policy.max_file_size_bytes = 1024;

    let app = router_with_file_tools(policy);
    let file_path = tmp.path().join("note.txt");

    let write_response = app
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/mcp/tools/call")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(
                    serde_json::json!({
                        "name": "write_file",
                        "arguments": {"path": file_path.to_string_lossy(), "content": "hello from a test"}
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(write_response.status(), axum::http::StatusCode::OK);
    let body = axum::body::to_bytes(write_response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["isError"], false);

    let read_response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/mcp/tools/call")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(
                    serde_json::json!({
                        "name": "read_file",
                        "arguments": {"path": file_path.to_string_lossy()}
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(read_response.status(), axum::http::StatusCode::OK);
    let body = axum::body::to_bytes(read_response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["content"][0]["text"], "hello from a test");
}
