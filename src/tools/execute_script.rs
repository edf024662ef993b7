//! `execute_script` tool: evaluate a JS expression on a page.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::browser_manager::BrowserManager;
use crate::errors::McpError;
use crate::protocol::ToolResult;
use crate::tool::Tool;

pub struct ExecuteScriptTool {
    browser: Arc<BrowserManager>,
}

impl ExecuteScriptTool {
    #[must_use]
    pub fn new(browser: Arc<BrowserManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for ExecuteScriptTool {
    fn name(&self) -> &str {
        "execute_script"
    }

    fn description(&self) -> &str {
        "Evaluate a JavaScript expression on a page and return its JSON-serialized value. \
         Promise results are awaited."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": {"type": "string"},
                "script": {"type": "string", "description": "A JS expression, not a full program"}
            },
            "required": ["page_id", "script"]
        })
    }

    fn uses_browser(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, McpError> {
        let page_id = args["page_id"]
            .as_str()
            .ok_or_else(|| McpError::InvalidParams("'page_id' must be a string".into()))?;
        let script = args["script"]
            .as_str()
            .ok_or_else(|| McpError::InvalidParams("'script' must be a string".into()))?;

        match self.browser.execute_script(page_id, script).await {
            Ok(value) => Ok(ToolResult::ok_text(value.to_string())),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}
