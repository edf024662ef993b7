//! The envelope's always-on special tools (§4.7): `help`, `debug_info`,
//! `browser_health`. These bypass circuit breaker checks so they remain
//! callable when other subsystems are down.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::browser_manager::BrowserManager;
use crate::circuit_breaker::{CircuitBreakers, CircuitState};
use crate::errors::McpError;
use crate::protocol::ToolResult;
use crate::tool::{Tool, ToolRegistry};

pub struct HelpTool {
    registry: Arc<ToolRegistry>,
}

impl HelpTool {
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for HelpTool {
    fn name(&self) -> &str {
        "help"
    }

    fn description(&self) -> &str {
        "List every registered tool with its description and input schema."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    fn bypasses_breakers(&self) -> bool {
        true
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult, McpError> {
        let descriptors = self.registry.list();
        let mut text = format!("{} tool(s) registered:\n\n", descriptors.len());
        for d in &descriptors {
            text.push_str(&format!("- {}: {}\n", d.name, d.description));
        }
        Ok(ToolResult::ok_text(text))
    }
}

pub struct DebugInfoTool {
    browser: Arc<BrowserManager>,
    breakers: Arc<CircuitBreakers>,
}

impl DebugInfoTool {
    #[must_use]
    pub fn new(browser: Arc<BrowserManager>, breakers: Arc<CircuitBreakers>) -> Self {
        Self { browser, breakers }
    }
}

fn state_label(s: CircuitState) -> &'static str {
    match s {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
    }
}

#[async_trait]
impl Tool for DebugInfoTool {
    fn name(&self) -> &str {
        "debug_info"
    }

    fn description(&self) -> &str {
        "Report circuit breaker states/trip counts and the current page count, for operator diagnostics."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    fn bypasses_breakers(&self) -> bool {
        true
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult, McpError> {
        let info = json!({
            "page_count": self.browser.page_count(),
            "circuits": {
                "browser": {
                    "state": state_label(self.breakers.browser.state()),
                    "total_trips": self.breakers.browser.total_trips(),
                },
                "network": {
                    "state": state_label(self.breakers.network.state()),
                    "total_trips": self.breakers.network.total_trips(),
                },
                "tool": {
                    "state": state_label(self.breakers.tool.state()),
                    "total_trips": self.breakers.tool.total_trips(),
                },
            }
        });
        Ok(ToolResult::ok_text(info.to_string()))
    }
}

pub struct BrowserHealthTool {
    browser: Arc<BrowserManager>,
}

impl BrowserHealthTool {
    #[must_use]
    pub fn new(browser: Arc<BrowserManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for BrowserHealthTool {
    fn name(&self) -> &str {
        "browser_health"
    }

    fn description(&self) -> &str {
        "Probe the browser subsystem directly, bypassing circuit breakers."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    fn bypasses_breakers(&self) -> bool {
        true
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult, McpError> {
        let healthy = self.browser.health().await;
        Ok(ToolResult::ok_text(json!({"healthy": healthy}).to_string()))
    }
}
