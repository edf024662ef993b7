//! Element interaction tools: `click_element`, `type_text`, `hover_element`,
//! `wait_for_element`. Each is a thin wrapper over the matching Browser
//! Manager (F) operation, sharing the same argument shape.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::browser_manager::BrowserManager;
use crate::errors::McpError;
use crate::protocol::ToolResult;
use crate::tool::Tool;

fn selector_args(args: &Value) -> Result<(&str, &str), McpError> {
    let page_id = args["page_id"]
        .as_str()
        .ok_or_else(|| McpError::InvalidParams("'page_id' must be a string".into()))?;
    let selector = args["selector"]
        .as_str()
        .ok_or_else(|| McpError::InvalidParams("'selector' must be a string".into()))?;
    Ok((page_id, selector))
}

pub struct ClickElementTool {
    browser: Arc<BrowserManager>,
}

impl ClickElementTool {
    #[must_use]
    pub fn new(browser: Arc<BrowserManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for ClickElementTool {
    fn name(&self) -> &str {
        "click_element"
    }
    fn description(&self) -> &str {
        "Wait for a CSS selector to become visible, then click it."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"page_id": {"type": "string"}, "selector": {"type": "string"}},
            "required": ["page_id", "selector"]
        })
    }
    fn uses_browser(&self) -> bool {
        true
    }
    async fn execute(&self, args: Value) -> Result<ToolResult, McpError> {
        let (page_id, selector) = selector_args(&args)?;
        match self.browser.click(page_id, selector).await {
            Ok(()) => Ok(ToolResult::ok_text(format!("clicked {selector}"))),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

pub struct TypeTextTool {
    browser: Arc<BrowserManager>,
}

impl TypeTextTool {
    #[must_use]
    pub fn new(browser: Arc<BrowserManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for TypeTextTool {
    fn name(&self) -> &str {
        "type_text"
    }
    fn description(&self) -> &str {
        "Wait for a CSS selector to become visible, click it, then type the given text."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": {"type": "string"},
                "selector": {"type": "string"},
                "text": {"type": "string"}
            },
            "required": ["page_id", "selector", "text"]
        })
    }
    fn uses_browser(&self) -> bool {
        true
    }
    async fn execute(&self, args: Value) -> Result<ToolResult, McpError> {
        let (page_id, selector) = selector_args(&args)?;
        let text = args["text"]
            .as_str()
            .ok_or_else(|| McpError::InvalidParams("'text' must be a string".into()))?;
        match self.browser.type_text(page_id, selector, text).await {
            Ok(()) => Ok(ToolResult::ok_text(format!("typed into {selector}"))),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

pub struct HoverElementTool {
    browser: Arc<BrowserManager>,
}

impl HoverElementTool {
    #[must_use]
    pub fn new(browser: Arc<BrowserManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for HoverElementTool {
    fn name(&self) -> &str {
        "hover_element"
    }
    fn description(&self) -> &str {
        "Wait for a CSS selector to become visible, then hover over it."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"page_id": {"type": "string"}, "selector": {"type": "string"}},
            "required": ["page_id", "selector"]
        })
    }
    fn uses_browser(&self) -> bool {
        true
    }
    async fn execute(&self, args: Value) -> Result<ToolResult, McpError> {
        let (page_id, selector) = selector_args(&args)?;
        match self.browser.hover(page_id, selector).await {
            Ok(()) => Ok(ToolResult::ok_text(format!("hovered {selector}"))),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

pub struct WaitForElementTool {
    browser: Arc<BrowserManager>,
}

impl WaitForElementTool {
    #[must_use]
    pub fn new(browser: Arc<BrowserManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for WaitForElementTool {
    fn name(&self) -> &str {
        "wait_for_element"
    }
    fn description(&self) -> &str {
        "Block until a CSS selector becomes visible, or time out."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": {"type": "string"},
                "selector": {"type": "string"},
                "timeout_secs": {"type": "integer"}
            },
            "required": ["page_id", "selector"]
        })
    }
    fn uses_browser(&self) -> bool {
        true
    }
    fn deadline(&self) -> Duration {
        Duration::from_secs(60)
    }
    async fn execute(&self, args: Value) -> Result<ToolResult, McpError> {
        let (page_id, selector) = selector_args(&args)?;
        let timeout = Duration::from_secs(args["timeout_secs"].as_u64().unwrap_or(10));
        match self.browser.wait_for_element(page_id, selector, timeout).await {
            Ok(()) => Ok(ToolResult::ok_text(format!("{selector} is visible"))),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}
