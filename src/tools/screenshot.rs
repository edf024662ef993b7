//! `take_screenshot` tool (F::screenshot wrapped as base64 image content).

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use crate::browser_manager::BrowserManager;
use crate::errors::McpError;
use crate::protocol::{ContentItem, ToolResult};
use crate::tool::Tool;

pub struct TakeScreenshotTool {
    browser: Arc<BrowserManager>,
}

impl TakeScreenshotTool {
    #[must_use]
    pub fn new(browser: Arc<BrowserManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for TakeScreenshotTool {
    fn name(&self) -> &str {
        "take_screenshot"
    }

    fn description(&self) -> &str {
        "Capture a PNG screenshot of a page, optionally scoped to one element or the full scrollable page."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": {"type": "string"},
                "full_page": {"type": "boolean"},
                "element_selector": {"type": "string"}
            },
            "required": ["page_id"]
        })
    }

    fn uses_browser(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, McpError> {
        let page_id = args["page_id"]
            .as_str()
            .ok_or_else(|| McpError::InvalidParams("'page_id' must be a string".into()))?;
        let full_page = args["full_page"].as_bool().unwrap_or(false);
        let element_selector = args["element_selector"].as_str();

        match self
            .browser
            .screenshot(page_id, full_page, element_selector)
            .await
        {
            Ok(bytes) => {
                let data = base64::engine::general_purpose::STANDARD.encode(bytes);
                Ok(ToolResult::ok(vec![ContentItem::image(data, "image/png")]))
            }
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}
