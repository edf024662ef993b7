//! Shared fixtures for the integration tests under `tests/`.
//!
//! Keeps the cross-cutting end-to-end scenarios independent from any real
//! Chrome/CDP process: a synthetic `Tool` impl and an in-memory duplex pipe
//! stand in for the browser and the transport respectively.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use browservisor::circuit_breaker::CircuitBreakers;
use browservisor::connection::ConnectionManager;
use browservisor::dispatcher::stdio::{ExitOutcome, StdioDispatcher};
use browservisor::errors::McpError;
use browservisor::protocol::ToolResult;
use browservisor::tool::{Tool, ToolEnvelope, ToolRegistry};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "echoes its 'text' argument back as content"
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        })
    }
    async fn execute(&self, args: Value) -> Result<ToolResult, McpError> {
        let text = args["text"].as_str().unwrap_or_default();
        Ok(ToolResult::ok_text(text))
    }
}

pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "always_fails"
    }
    fn description(&self) -> &str {
        "unconditionally returns an error result"
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, _args: Value) -> Result<ToolResult, McpError> {
        Ok(ToolResult::error("synthetic failure"))
    }
}

/// An envelope wired with `EchoTool` and `FailingTool`, backed by fresh
/// circuit breakers, mirroring the wiring `Orchestrator::new` does in §5.
pub fn test_envelope() -> Arc<ToolEnvelope> {
    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(EchoTool));
    registry.register(Arc::new(FailingTool));
    Arc::new(ToolEnvelope::new(registry, Arc::new(CircuitBreakers::default())))
}

type ServerRead = tokio::io::ReadHalf<tokio::io::DuplexStream>;
type ServerWrite = tokio::io::WriteHalf<tokio::io::DuplexStream>;

/// A stdio dispatcher wired over an in-memory duplex pipe, so the dispatcher
/// loop's framing and timeout logic can be exercised without real stdio.
pub struct StdioHarness {
    pub dispatcher: Arc<StdioDispatcher<ServerRead, ServerWrite>>,
    pub client: tokio::io::DuplexStream,
    pub cancel: CancellationToken,
}

pub fn stdio_harness() -> StdioHarness {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (read_half, write_half) = tokio::io::split(server);
    let conn = Arc::new(ConnectionManager::new(
        read_half,
        write_half,
        Duration::from_millis(200),
        Duration::from_secs(1),
    ));
    let cancel = CancellationToken::new();
    let dispatcher = Arc::new(StdioDispatcher::new(conn, test_envelope(), cancel.clone()));
    StdioHarness {
        dispatcher,
        client,
        cancel,
    }
}

#[allow(dead_code)]
pub fn exit_outcome_name(outcome: ExitOutcome) -> &'static str {
    match outcome {
        ExitOutcome::Disconnected => "disconnected",
        ExitOutcome::ConsecutiveTimeouts => "consecutive_timeouts",
        ExitOutcome::Cancelled => "cancelled",
    }
}
