//! JSON-RPC stdio dispatcher (§4.8, Component H).
//!
//! Reads one newline-delimited JSON message at a time from (E), dispatches
//! each request to its own worker task so a slow tool body cannot stall the
//! read pump, and serializes responses back onto stdout. A sliding
//! consecutive-read-timeout counter triggers shutdown if the transport goes
//! non-responsive for too long — the primary guard against the "infinite
//! loop on timeout" failure mode named in the design notes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::connection::{ConnectionManager, ReadOutcome};
use crate::errors::McpError;
use crate::protocol::{
    InitializeParams, InitializeResult, RpcRequest, RpcResponse, ServerInfo, ToolCallParams,
    JSONRPC_VERSION, PROTOCOL_VERSION,
};
use crate::tool::ToolEnvelope;

/// 10 consecutive read timeouts inside a 5-second sliding window (§4.8).
const TIMEOUT_WINDOW: Duration = Duration::from_secs(5);
const TIMEOUT_THRESHOLD: usize = 10;

/// Why the dispatcher's message pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Transport closed cleanly (second consecutive EOF).
    Disconnected,
    /// Too many consecutive read timeouts (§4.8, scenario 4 in §8). Exit
    /// code 2 per §6.
    ConsecutiveTimeouts,
    /// The root cancellation token fired (SIGINT/SIGTERM).
    Cancelled,
}

pub struct StdioDispatcher<R, W> {
    conn: Arc<ConnectionManager<R, W>>,
    envelope: Arc<ToolEnvelope>,
    initialized: AtomicBool,
    cancel: CancellationToken,
}

impl<R, W> StdioDispatcher<R, W>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    #[must_use]
    pub fn new(
        conn: Arc<ConnectionManager<R, W>>,
        envelope: Arc<ToolEnvelope>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            conn,
            envelope,
            initialized: AtomicBool::new(false),
            cancel,
        }
    }

    /// Run the message pump until disconnection, cancellation, or the
    /// consecutive-timeout threshold trips.
    pub async fn run(self: Arc<Self>) -> ExitOutcome {
        let mut timeout_log: VecDeque<Instant> = VecDeque::new();

        loop {
            if self.cancel.is_cancelled() {
                info!(target: "dispatcher::stdio", "cancellation token fired, stopping pump");
                return ExitOutcome::Cancelled;
            }

            let outcome = tokio::select! {
                () = self.cancel.cancelled() => {
                    return ExitOutcome::Cancelled;
                }
                result = self.conn.read_message() => result,
            };

            match outcome {
                Ok(ReadOutcome::Line(line)) => {
                    timeout_log.clear();
                    if line.trim().is_empty() {
                        continue;
                    }
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.handle_line(line).await;
                    });
                }
                Ok(ReadOutcome::EofRecoverable) => {
                    continue;
                }
                Ok(ReadOutcome::EofFatal) => {
                    warn!(target: "dispatcher::stdio", "transport EOF, stopping pump");
                    return ExitOutcome::Disconnected;
                }
                Err(crate::connection::ConnError::ReadTimeout) => {
                    let now = Instant::now();
                    timeout_log.push_back(now);
                    while let Some(front) = timeout_log.front() {
                        if now.duration_since(*front) > TIMEOUT_WINDOW {
                            timeout_log.pop_front();
                        } else {
                            break;
                        }
                    }
                    if timeout_log.len() >= TIMEOUT_THRESHOLD {
                        error!(
                            target: "dispatcher::stdio",
                            count = timeout_log.len(),
                            "too many consecutive timeouts, shutting down"
                        );
                        return ExitOutcome::ConsecutiveTimeouts;
                    }
                }
                Err(e) => {
                    error!(target: "dispatcher::stdio", error = %e, "fatal transport error");
                    return ExitOutcome::Disconnected;
                }
            }
        }
    }

    async fn handle_line(&self, line: String) {
        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                let response = RpcResponse::failure(
                    None,
                    crate::errors::rpc_code::PARSE_ERROR,
                    format!("failed to parse JSON-RPC message: {e}"),
                );
                self.send(response).await;
                return;
            }
        };

        if request.is_notification() {
            self.handle_notification(&request);
            return;
        }

        let id = request.id.clone();
        let response = match self.dispatch(request).await {
            Ok(result) => RpcResponse::success(id, result),
            Err(err) => match err.to_protocol_error() {
                Some((code, message)) => RpcResponse::failure(id, code, message),
                None => RpcResponse::success(
                    id,
                    serde_json::to_value(crate::protocol::ToolResult::error(err.to_string()))
                        .unwrap_or(serde_json::Value::Null),
                ),
            },
        };
        self.send(response).await;
    }

    fn handle_notification(&self, request: &RpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => {
                info!(target: "dispatcher::stdio", "client acknowledged initialization");
            }
            other => {
                warn!(target: "dispatcher::stdio", method = other, "unhandled notification");
            }
        }
    }

    async fn dispatch(&self, request: RpcRequest) -> Result<serde_json::Value, McpError> {
        match request.method.as_str() {
            "initialize" => {
                let params: InitializeParams = request
                    .params
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| McpError::InvalidParams(e.to_string()))?
                    .unwrap_or_default();
                self.initialized.store(true, Ordering::SeqCst);
                let result = InitializeResult {
                    protocol_version: if params.protocol_version.is_empty() {
                        PROTOCOL_VERSION.to_string()
                    } else {
                        params.protocol_version
                    },
                    capabilities: serde_json::json!({"tools": {}}),
                    server_info: ServerInfo {
                        name: "browservisor".to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                };
                serde_json::to_value(result).map_err(|e| McpError::Other(e.into()))
            }
            "tools/list" => {
                let tools = self.envelope.list_tools();
                serde_json::to_value(serde_json::json!({"tools": tools}))
                    .map_err(|e| McpError::Other(e.into()))
            }
            "tools/call" => {
                let params: ToolCallParams = request
                    .params
                    .ok_or_else(|| McpError::InvalidParams("missing 'params'".into()))
                    .and_then(|p| {
                        serde_json::from_value(p).map_err(|e| McpError::InvalidParams(e.to_string()))
                    })?;
                let result = self.envelope.call(&params.name, params.arguments).await?;
                serde_json::to_value(result).map_err(|e| McpError::Other(e.into()))
            }
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    async fn send(&self, response: RpcResponse) {
        let line = match serde_json::to_string(&response) {
            Ok(l) => l,
            Err(e) => {
                error!(target: "dispatcher::stdio", error = %e, "failed to serialize response");
                return;
            }
        };
        if let Err(e) = self.conn.write_message(&line).await {
            error!(target: "dispatcher::stdio", error = %e, "failed to write response");
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakers;
    use crate::tool::ToolRegistry;
    use tokio::io::duplex;

    fn jsonrpc_version_used() -> &'static str {
        JSONRPC_VERSION
    }

    #[tokio::test]
    async fn initialize_then_tools_list_round_trip() {
        assert_eq!(jsonrpc_version_used(), "2.0");

        let (mut client, server) = duplex(8192);
        let (server_r, server_w) = tokio::io::split(server);
        let conn = Arc::new(ConnectionManager::new(
            server_r,
            server_w,
            Duration::from_secs(5),
            Duration::from_secs(5),
        ));
        let registry = Arc::new(ToolRegistry::new());
        let envelope = Arc::new(ToolEnvelope::new(registry, Arc::new(CircuitBreakers::default())));
        let cancel = CancellationToken::new();
        let dispatcher = Arc::new(StdioDispatcher::new(conn, envelope, cancel.clone()));

        let pump = tokio::spawn(dispatcher.clone().run());

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        client
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{\"protocolVersion\":\"2025-06-18\"}}\n")
            .await
            .unwrap();
        client
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n")
            .await
            .unwrap();
        client
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n")
            .await
            .unwrap();

        let mut buf = vec![0u8; 8192];
        let mut collected = String::new();
        while collected.matches('\n').count() < 2 {
            let n = client.read(&mut buf).await.unwrap();
            collected.push_str(&String::from_utf8_lossy(&buf[..n]));
        }

        assert!(collected.contains("\"protocolVersion\":\"2025-06-18\""));
        assert!(collected.contains("\"tools\":[]") || collected.contains("\"tools\": []"));

        cancel.cancel();
        let _ = pump.await;
    }

    #[tokio::test]
    async fn unknown_method_returns_protocol_error() {
        let (mut client, server) = duplex(4096);
        let (server_r, server_w) = tokio::io::split(server);
        let conn = Arc::new(ConnectionManager::new(
            server_r,
            server_w,
            Duration::from_secs(5),
            Duration::from_secs(5),
        ));
        let registry = Arc::new(ToolRegistry::new());
        let envelope = Arc::new(ToolEnvelope::new(registry, Arc::new(CircuitBreakers::default())));
        let cancel = CancellationToken::new();
        let dispatcher = Arc::new(StdioDispatcher::new(conn, envelope, cancel.clone()));
        let pump = tokio::spawn(dispatcher.clone().run());

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        client
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"not_a_method\"}\n")
            .await
            .unwrap();

        let mut buf = vec![0u8; 4096];
        let n = client.read(&mut buf).await.unwrap();
        let response = String::from_utf8_lossy(&buf[..n]).to_string();
        assert!(response.contains("-32601"));
        assert!(!response.contains("\"result\""));

        cancel.cancel();
        let _ = pump.await;
    }
}
