//! Concrete tool catalog (§10.5): a representative slice of tools built on
//! the `Tool` contract (G), enough to exercise every component end-to-end.

mod diagnostics;
mod execute_script;
mod file_tools;
mod http_request;
mod interact;
mod open_page;
mod screenshot;

pub use diagnostics::{BrowserHealthTool, DebugInfoTool, HelpTool};
pub use execute_script::ExecuteScriptTool;
pub use file_tools::{ReadFileTool, WriteFileTool};
pub use http_request::HttpRequestTool;
pub use interact::{ClickElementTool, HoverElementTool, TypeTextTool, WaitForElementTool};
pub use open_page::{ClosePageTool, NavigatePageTool, OpenPageTool};
pub use screenshot::TakeScreenshotTool;

use std::sync::Arc;

use crate::browser_manager::BrowserManager;
use crate::circuit_breaker::CircuitBreakers;
use crate::path_validator::PathPolicy;
use crate::tool::ToolRegistry;

/// Registers the full built-in catalog against `registry`. `help` is
/// registered last since it reports on the registry it is itself part of.
pub fn register_all(
    registry: &Arc<ToolRegistry>,
    browser: &Arc<BrowserManager>,
    breakers: &Arc<CircuitBreakers>,
    path_policy: &Arc<PathPolicy>,
    http_client: reqwest::Client,
) {
    registry.register(Arc::new(OpenPageTool::new(browser.clone())));
    registry.register(Arc::new(NavigatePageTool::new(browser.clone())));
    registry.register(Arc::new(ClosePageTool::new(browser.clone())));
    registry.register(Arc::new(TakeScreenshotTool::new(browser.clone())));
    registry.register(Arc::new(ExecuteScriptTool::new(browser.clone())));
    registry.register(Arc::new(ClickElementTool::new(browser.clone())));
    registry.register(Arc::new(TypeTextTool::new(browser.clone())));
    registry.register(Arc::new(HoverElementTool::new(browser.clone())));
    registry.register(Arc::new(WaitForElementTool::new(browser.clone())));
    registry.register(Arc::new(ReadFileTool::new(path_policy.clone())));
    registry.register(Arc::new(WriteFileTool::new(path_policy.clone())));
    registry.register(Arc::new(HttpRequestTool::new(http_client)));
    registry.register(Arc::new(DebugInfoTool::new(browser.clone(), breakers.clone())));
    registry.register(Arc::new(BrowserHealthTool::new(browser.clone())));
    registry.register(Arc::new(HelpTool::new(registry.clone())));
}
