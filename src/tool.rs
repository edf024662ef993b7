//! Tool contract, registry, and per-call execution envelope (§4.7).
//!
//! A `Tool` is a tagged-union-by-trait-object value: name, description,
//! input schema, and an async `execute` function — no inheritance, per the
//! "dynamic dispatch without subtype chains" design note (§9).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{info, warn};

use crate::circuit_breaker::CircuitBreakers;
use crate::errors::McpError;
use crate::protocol::ToolResult;
use crate::utils::constants::DEFAULT_TOOL_DEADLINE_SECS;

/// The uniform ABI every tool body implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;

    /// Whether this tool drives the browser (gates the browser breaker in
    /// addition to the tool breaker) and/or makes outbound network calls
    /// (gates the network breaker).
    fn uses_browser(&self) -> bool {
        false
    }
    fn uses_network(&self) -> bool {
        false
    }

    /// Override to give this tool call a deadline other than the envelope
    /// default (§4.7 step 4).
    fn deadline(&self) -> Duration {
        Duration::from_secs(DEFAULT_TOOL_DEADLINE_SECS)
    }

    /// Whether this tool bypasses breaker checks entirely (`help`,
    /// `debug_info`, `browser_health` — §4.7's "special tools").
    fn bypasses_breakers(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, McpError>;
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Maps unique tool names to their descriptors. Re-registration replaces
/// in place; listing returns insertion order (§4.7).
#[derive(Default)]
pub struct ToolRegistry {
    order: RwLock<Vec<String>>,
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let mut tools = self.tools.write();
        let mut order = self.order.write();
        if tools.insert(name.clone(), tool).is_none() {
            order.push(name);
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    #[must_use]
    pub fn list(&self) -> Vec<ToolDescriptor> {
        let tools = self.tools.read();
        self.order
            .read()
            .iter()
            .filter_map(|name| tools.get(name))
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lightweight schema check: required-parameter presence plus primitive
/// type checks. Full JSON-Schema validation is explicitly optional (§4.7
/// step 2).
pub fn validate_params(schema: &Value, args: &Value) -> Result<(), McpError> {
    let Some(required) = schema.get("required").and_then(Value::as_array) else {
        return Ok(());
    };
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    let args_obj = args.as_object().cloned().unwrap_or_default();

    for req in required {
        let Some(key) = req.as_str() else { continue };
        let Some(value) = args_obj.get(key) else {
            return Err(McpError::InvalidParams(format!(
                "missing required parameter '{key}'"
            )));
        };
        if let Some(prop_schema) = properties.get(key)
            && let Some(expected_type) = prop_schema.get("type").and_then(Value::as_str)
            && !matches_primitive_type(value, expected_type)
        {
            return Err(McpError::InvalidParams(format!(
                "parameter '{key}' expected type '{expected_type}', got {value}"
            )));
        }
    }
    Ok(())
}

fn matches_primitive_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

/// The per-call execution envelope (§4.7 steps 1-7), applied identically by
/// both dispatchers.
pub struct ToolEnvelope {
    registry: Arc<ToolRegistry>,
    breakers: Arc<CircuitBreakers>,
}

impl ToolEnvelope {
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, breakers: Arc<CircuitBreakers>) -> Self {
        Self { registry, breakers }
    }

    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.registry.list()
    }

    /// Runs the full envelope and always produces a `ToolResult` (never a
    /// protocol error) -- except for `MethodNotFound`, which the caller
    /// shapes into a JSON-RPC `error` response instead, per §7.
    pub async fn call(&self, name: &str, args: Value) -> Result<ToolResult, McpError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| McpError::MethodNotFound(name.to_string()))?;

        if let Err(e) = validate_params(&tool.input_schema(), &args) {
            return Ok(ToolResult::error(e.to_string()));
        }

        if tool.bypasses_breakers() {
            return Ok(self.run_with_deadline(tool, args).await);
        }

        let tool_permit = match self.breakers.tool.try_acquire() {
            Some(p) => p,
            None => {
                warn!(target: "tool_envelope", name, "tool circuit open");
                return Ok(ToolResult::error(format!(
                    "the '{name}' tool subsystem is temporarily disabled (circuit open); retry shortly"
                )));
            }
        };
        let browser_permit = if tool.uses_browser() {
            match self.breakers.browser.try_acquire() {
                Some(p) => Some(p),
                None => {
                    self.breakers.tool.record_failure(tool_permit);
                    warn!(target: "tool_envelope", name, "browser circuit open");
                    return Ok(ToolResult::error(format!(
                        "the browser subsystem is temporarily disabled (circuit open); '{name}' cannot run until it recovers"
                    )));
                }
            }
        } else {
            None
        };
        let network_permit = if tool.uses_network() {
            match self.breakers.network.try_acquire() {
                Some(p) => Some(p),
                None => {
                    self.breakers.tool.record_failure(tool_permit);
                    if let Some(p) = browser_permit {
                        self.breakers.browser.record_failure(p);
                    }
                    warn!(target: "tool_envelope", name, "network circuit open");
                    return Ok(ToolResult::error(format!(
                        "the network subsystem is temporarily disabled (circuit open); '{name}' cannot run until it recovers"
                    )));
                }
            }
        } else {
            None
        };

        let result = self.run_with_deadline(tool.clone(), args).await;

        if result.is_error {
            self.breakers.tool.record_failure(tool_permit);
            if let Some(p) = browser_permit {
                self.breakers.browser.record_failure(p);
            }
            if let Some(p) = network_permit {
                self.breakers.network.record_failure(p);
            }
        } else {
            self.breakers.tool.record_success(tool_permit);
            if let Some(p) = browser_permit {
                self.breakers.browser.record_success(p);
            }
            if let Some(p) = network_permit {
                self.breakers.network.record_success(p);
            }
        }

        Ok(result)
    }

    /// Step 4/5: attach a deadline, run the tool body as a supervised task
    /// so a hung body can't hold the dispatcher, and shape panics/timeouts
    /// into an `is_error` result rather than propagating them.
    async fn run_with_deadline(&self, tool: Arc<dyn Tool>, args: Value) -> ToolResult {
        let name = tool.name().to_string();
        let deadline = tool.deadline();
        let task = tokio::spawn(async move { tool.execute(args).await });

        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(err))) => ToolResult::error(err.to_string()),
            Ok(Err(join_err)) => {
                warn!(target: "tool_envelope", name, error = %join_err, "tool body panicked");
                ToolResult::error(format!(
                    "tool '{name}' panicked during execution: {join_err}"
                ))
            }
            Err(_) => {
                info!(target: "tool_envelope", name, deadline_secs = deadline.as_secs(), "tool call exceeded deadline");
                ToolResult::error(format!(
                    "tool '{name}' exceeded its {}s deadline and was aborted",
                    deadline.as_secs()
                ))
            }
        }
    }
}
