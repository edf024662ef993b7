//! `open_page` / `navigate_page` / `close_page` tools — thin wrappers over
//! the Browser Manager (F).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::browser_manager::BrowserManager;
use crate::errors::{ErrorContext, McpError};
use crate::protocol::ToolResult;
use crate::protocol::PageRecord;
use crate::tool::Tool;

fn record_to_json(record: &PageRecord) -> String {
    serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
}

pub struct OpenPageTool {
    browser: Arc<BrowserManager>,
}

impl OpenPageTool {
    #[must_use]
    pub fn new(browser: Arc<BrowserManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for OpenPageTool {
    fn name(&self) -> &str {
        "open_page"
    }

    fn description(&self) -> &str {
        "Open a new browser page at the given URL and return its page_id."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Absolute URL or file:// path to load"}
            },
            "required": ["url"]
        })
    }

    fn uses_browser(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, McpError> {
        let url = args["url"]
            .as_str()
            .ok_or_else(|| McpError::InvalidParams("'url' must be a string".into()))?;
        if !crate::utils::is_valid_url(url) {
            return Ok(ToolResult::error(
                ErrorContext::new("open_page")
                    .detail(format!("'{url}' is not a valid http(s)/file URL"))
                    .suggest("pass an absolute URL such as https://example.com")
                    .build(),
            ));
        }
        match self.browser.open_page(url).await {
            Ok(record) => Ok(ToolResult::ok_text(record_to_json(&record))),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

pub struct NavigatePageTool {
    browser: Arc<BrowserManager>,
}

impl NavigatePageTool {
    #[must_use]
    pub fn new(browser: Arc<BrowserManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for NavigatePageTool {
    fn name(&self) -> &str {
        "navigate_page"
    }

    fn description(&self) -> &str {
        "Navigate an already-open page to a new URL, waiting for the load event."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": {"type": "string"},
                "url": {"type": "string"}
            },
            "required": ["page_id", "url"]
        })
    }

    fn uses_browser(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, McpError> {
        let page_id = args["page_id"]
            .as_str()
            .ok_or_else(|| McpError::InvalidParams("'page_id' must be a string".into()))?;
        let url = args["url"]
            .as_str()
            .ok_or_else(|| McpError::InvalidParams("'url' must be a string".into()))?;
        match self.browser.navigate(page_id, url).await {
            Ok(record) => Ok(ToolResult::ok_text(record_to_json(&record))),
            Err(McpError::PageNotFound(id)) => Ok(ToolResult::error(
                ErrorContext::new("navigate_page")
                    .detail(format!("no open page with id '{id}'"))
                    .suggest("call open_page first to obtain a page_id")
                    .build(),
            )),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

pub struct ClosePageTool {
    browser: Arc<BrowserManager>,
}

impl ClosePageTool {
    #[must_use]
    pub fn new(browser: Arc<BrowserManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for ClosePageTool {
    fn name(&self) -> &str {
        "close_page"
    }

    fn description(&self) -> &str {
        "Close a page and remove it from the page registry."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"page_id": {"type": "string"}},
            "required": ["page_id"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, McpError> {
        let page_id = args["page_id"]
            .as_str()
            .ok_or_else(|| McpError::InvalidParams("'page_id' must be a string".into()))?;
        match self.browser.close_page(page_id) {
            Ok(()) => Ok(ToolResult::ok_text(format!("closed {page_id}"))),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}
