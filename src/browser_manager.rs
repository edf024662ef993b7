//! Browser lifecycle manager (§4.6).
//!
//! Supervises a single Chromium-family subprocess over CDP: owns the page
//! registry, runs a periodic health check, and restarts the subprocess on
//! crash or corruption while preserving logical page identity (`page_id`
//! survives a restart even though the underlying CDP target does not).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::browser_setup::launch_browser_sized;
use crate::circuit_breaker::CircuitBreakers;
use crate::errors::McpError;
use crate::protocol::PageRecord;
use crate::retry::{retry_with_backoff, RetryStrategy};

#[derive(Debug, Clone)]
pub struct BrowserManagerConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub slow_motion: Duration,
}

impl Default for BrowserManagerConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            slow_motion: Duration::ZERO,
        }
    }
}

struct BrowserHandle {
    browser: Browser,
    handler_task: JoinHandle<()>,
    user_data_dir: PathBuf,
}

/// A live, attached page: the CDP-facing handle plus its bookkeeping record.
struct PageEntry {
    page: Page,
    record: PageRecord,
}

pub struct BrowserManager {
    config: RwLock<BrowserManagerConfig>,
    handle: RwLock<Option<BrowserHandle>>,
    pages: DashMap<String, PageEntry>,
    next_page_id: AtomicU64,
    consecutive_unhealthy: AtomicU64,
    breakers: Arc<CircuitBreakers>,
}

impl BrowserManager {
    #[must_use]
    pub fn new(config: BrowserManagerConfig, breakers: Arc<CircuitBreakers>) -> Arc<Self> {
        Arc::new(Self {
            config: RwLock::new(config),
            handle: RwLock::new(None),
            pages: DashMap::new(),
            next_page_id: AtomicU64::new(1),
            consecutive_unhealthy: AtomicU64::new(0),
            breakers,
        })
    }

    async fn ensure_started(&self) -> Result<(), McpError> {
        if self.handle.read().await.is_some() {
            return Ok(());
        }
        let mut guard = self.handle.write().await;
        if guard.is_some() {
            return Ok(());
        }
        let config = self.config.read().await.clone();
        let profile = crate::browser_profile::create_unique_profile()
            .map_err(|e| McpError::BrowserUnavailable(e.to_string()))?;
        let (browser, handler_task, user_data_dir) = launch_browser_sized(
            config.headless,
            Some(profile.into_path()),
            config.window_width,
            config.window_height,
        )
        .await
        .map_err(|e| McpError::BrowserUnavailable(e.to_string()))?;
        *guard = Some(BrowserHandle {
            browser,
            handler_task,
            user_data_dir,
        });
        Ok(())
    }

    fn new_page_id(&self) -> String {
        format!("page_{}", self.next_page_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Open a fresh page at `url`, returning its opaque stable `page_id`.
    pub async fn open_page(&self, url: &str) -> Result<PageRecord, McpError> {
        self.ensure_started().await?;
        let strategy = RetryStrategy::browser_operation();
        let page = retry_with_backoff(
            &strategy,
            tokio_util::sync::CancellationToken::new(),
            "open_page",
            || async {
                let guard = self.handle.read().await;
                let handle = guard
                    .as_ref()
                    .ok_or_else(|| McpError::BrowserUnavailable("browser not started".into()))?;
                handle
                    .browser
                    .new_page(url)
                    .await
                    .map_err(|e| McpError::Cdp(e.to_string()))
            },
        )
        .await
        .map_err(|e| McpError::BrowserUnavailable(e.to_string()))?;

        let page_id = self.new_page_id();
        let now = chrono::Utc::now();
        let title = page.evaluate("document.title").await.ok()
            .and_then(|v| v.into_value::<String>().ok())
            .unwrap_or_default();

        let record = PageRecord {
            page_id: page_id.clone(),
            url: url.to_string(),
            title,
            created_at: now,
            last_active: now,
            is_healthy: true,
            recovery_count: 0,
            last_error: None,
        };
        self.pages.insert(
            page_id.clone(),
            PageEntry {
                page,
                record: record.clone(),
            },
        );
        Ok(record)
    }

    /// Navigate an already-open page to a new URL, waiting for `load`.
    pub async fn navigate(&self, page_id: &str, url: &str) -> Result<PageRecord, McpError> {
        let page = self.page_handle(page_id)?;
        let strategy = RetryStrategy::browser_operation();
        let url_owned = url.to_string();
        retry_with_backoff(
            &strategy,
            tokio_util::sync::CancellationToken::new(),
            "navigate",
            || {
                let page = page.clone();
                let url = url_owned.clone();
                async move {
                    page.goto(url.as_str())
                        .await
                        .map_err(|e| McpError::NavigationFailed(e.to_string()))?;
                    page.wait_for_navigation()
                        .await
                        .map_err(|e| McpError::NavigationFailed(e.to_string()))?;
                    Ok(())
                }
            },
        )
        .await
        .map_err(|e| McpError::NavigationFailed(e.to_string()))?;

        self.touch_page(page_id, |record| {
            record.url = url.to_string();
            record.last_active = chrono::Utc::now();
        })
    }

    /// Take a screenshot. `full_page` is honored by the caller's
    /// `ScreenshotParams`; element capture scrolls the element into view
    /// first.
    pub async fn screenshot(
        &self,
        page_id: &str,
        full_page: bool,
        element_selector: Option<&str>,
    ) -> Result<Vec<u8>, McpError> {
        let page = self.page_handle(page_id)?;

        if let Some(selector) = element_selector {
            let element = page
                .find_element(selector)
                .await
                .map_err(|_| McpError::ElementNotFound(selector.to_string()))?;
            element
                .scroll_into_view()
                .await
                .map_err(|e| McpError::Cdp(e.to_string()))?;
            return element
                .screenshot(CaptureScreenshotFormat::Png)
                .await
                .map_err(|e| McpError::Cdp(e.to_string()));
        }

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        page.screenshot(params)
            .await
            .map_err(|e| McpError::Cdp(e.to_string()))
    }

    /// Evaluate a JS expression and return its JSON-serialized value.
    /// Promise results are awaited up to the caller's envelope deadline.
    pub async fn execute_script(
        &self,
        page_id: &str,
        src: &str,
    ) -> Result<serde_json::Value, McpError> {
        let page = self.page_handle(page_id)?;
        let result = page
            .evaluate(src)
            .await
            .map_err(|e| McpError::Cdp(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| McpError::Cdp(format!("failed to deserialize evaluation result: {e}")))
    }

    pub async fn click(&self, page_id: &str, selector: &str) -> Result<(), McpError> {
        let page = self.page_handle(page_id)?;
        let element = self.wait_for_visible(&page, selector, Duration::from_secs(10)).await?;
        element
            .click()
            .await
            .map_err(|e| McpError::Cdp(e.to_string()))?;
        self.sleep_slow_motion().await;
        Ok(())
    }

    pub async fn type_text(&self, page_id: &str, selector: &str, text: &str) -> Result<(), McpError> {
        let page = self.page_handle(page_id)?;
        let element = self.wait_for_visible(&page, selector, Duration::from_secs(10)).await?;
        element
            .click()
            .await
            .map_err(|e| McpError::Cdp(e.to_string()))?;
        element
            .type_str(text)
            .await
            .map_err(|e| McpError::Cdp(e.to_string()))?;
        self.sleep_slow_motion().await;
        Ok(())
    }

    pub async fn hover(&self, page_id: &str, selector: &str) -> Result<(), McpError> {
        let page = self.page_handle(page_id)?;
        let element = self.wait_for_visible(&page, selector, Duration::from_secs(10)).await?;
        element
            .hover()
            .await
            .map_err(|e| McpError::Cdp(e.to_string()))?;
        self.sleep_slow_motion().await;
        Ok(())
    }

    pub async fn wait_for_element(
        &self,
        page_id: &str,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), McpError> {
        let page = self.page_handle(page_id)?;
        self.wait_for_visible(&page, selector, timeout).await?;
        Ok(())
    }

    async fn wait_for_visible(
        &self,
        page: &Page,
        selector: &str,
        timeout: Duration,
    ) -> Result<chromiumoxide::element::Element, McpError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(element) = page.find_element(selector).await {
                let visible = element
                    .evaluate_value::<bool>(
                        "e => !!(e.offsetWidth || e.offsetHeight || e.getClientRects().length)",
                    )
                    .await
                    .unwrap_or(false);
                if visible {
                    return Ok(element);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(McpError::Timeout(format!(
                    "element '{selector}' not visible within {:.1}s",
                    timeout.as_secs_f64()
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn sleep_slow_motion(&self) {
        let delay = self.config.read().await.slow_motion;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn close_page(&self, page_id: &str) -> Result<(), McpError> {
        self.pages
            .remove(page_id)
            .map(|_| ())
            .ok_or_else(|| McpError::PageNotFound(page_id.to_string()))
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn get_page_status(&self, page_id: &str) -> Result<PageRecord, McpError> {
        self.pages
            .get(page_id)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| McpError::PageNotFound(page_id.to_string()))
    }

    fn page_handle(&self, page_id: &str) -> Result<Page, McpError> {
        self.pages
            .get(page_id)
            .map(|entry| entry.page.clone())
            .ok_or_else(|| McpError::PageNotFound(page_id.to_string()))
    }

    fn touch_page(
        &self,
        page_id: &str,
        f: impl FnOnce(&mut PageRecord),
    ) -> Result<PageRecord, McpError> {
        let mut entry = self
            .pages
            .get_mut(page_id)
            .ok_or_else(|| McpError::PageNotFound(page_id.to_string()))?;
        f(&mut entry.record);
        Ok(entry.record.clone())
    }

    /// Probe CDP health with a trivial RPC under a 5s deadline (§4.6).
    pub async fn health(&self) -> bool {
        let guard = self.handle.read().await;
        let Some(handle) = guard.as_ref() else {
            return false;
        };
        let probe = tokio::time::timeout(Duration::from_secs(5), handle.browser.version()).await;
        matches!(probe, Ok(Ok(_)))
    }

    /// Called by the orchestrator's supervisor every 10s (§4.6). Increments
    /// an unhealthy counter on failure and restarts after two consecutive
    /// unhealthy probes.
    pub async fn health_check_tick(self: &Arc<Self>) {
        if self.health().await {
            self.consecutive_unhealthy.store(0, Ordering::SeqCst);
            return;
        }
        let unhealthy = self.consecutive_unhealthy.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(target: "browser_manager", unhealthy, "health probe failed");
        if unhealthy >= 2 {
            self.consecutive_unhealthy.store(0, Ordering::SeqCst);
            if let Err(e) = self.restart().await {
                error!(target: "browser_manager", error = %e, "restart after unhealthy probes failed");
            }
        }
    }

    /// Restart-with-state-restore (§4.6): snapshot `(page_id -> url)`, stop
    /// the old process, relaunch, reopen each URL and reattach it to its
    /// existing `page_id` so external references remain valid.
    pub async fn restart(&self) -> Result<(), McpError> {
        info!(target: "browser_manager", "restarting browser, preserving page identity");
        let snapshot: HashMap<String, String> = self
            .pages
            .iter()
            .map(|e| (e.key().clone(), e.record.url.clone()))
            .collect();

        {
            let mut guard = self.handle.write().await;
            if let Some(mut old) = guard.take() {
                let close_result =
                    tokio::time::timeout(Duration::from_secs(3), old.browser.close()).await;
                if close_result.is_err() {
                    warn!(target: "browser_manager", "browser did not close within grace period, forcing drop");
                }
                old.handler_task.abort();
                let _ = std::fs::remove_dir_all(&old.user_data_dir);
            }

            let config = self.config.read().await.clone();
            let profile = crate::browser_profile::create_unique_profile()
                .map_err(|e| McpError::BrowserRestartFailed(e.to_string()))?;
            let (browser, handler_task, user_data_dir) = launch_browser_sized(
                config.headless,
                Some(profile.into_path()),
                config.window_width,
                config.window_height,
            )
            .await
            .map_err(|e| McpError::BrowserRestartFailed(e.to_string()))?;
            *guard = Some(BrowserHandle {
                browser,
                handler_task,
                user_data_dir,
            });
        }

        self.breakers.browser.reset();

        for (page_id, url) in snapshot {
            match self.reopen_page(&url).await {
                Ok(page) => {
                    if let Some(mut entry) = self.pages.get_mut(&page_id) {
                        entry.page = page;
                        entry.record.recovery_count += 1;
                        entry.record.is_healthy = true;
                        entry.record.last_active = chrono::Utc::now();
                    }
                }
                Err(e) => {
                    warn!(target: "browser_manager", page_id, error = %e, "failed to restore page after restart");
                    if let Some(mut entry) = self.pages.get_mut(&page_id) {
                        entry.record.is_healthy = false;
                        entry.record.last_error = Some(e.to_string());
                    }
                }
            }
        }

        Ok(())
    }

    async fn reopen_page(&self, url: &str) -> Result<Page, McpError> {
        let guard = self.handle.read().await;
        let handle = guard
            .as_ref()
            .ok_or_else(|| McpError::BrowserUnavailable("no browser after restart".into()))?;
        handle
            .browser
            .new_page(url)
            .await
            .map_err(|e| McpError::Cdp(e.to_string()))
    }

    /// Toggle headless/visible mode. Same state-preservation flow as
    /// `restart` since the browser process must be relaunched with a new
    /// config (§4.6).
    pub async fn set_visibility(&self, headless: bool) -> Result<(), McpError> {
        {
            let mut config = self.config.write().await;
            if config.headless == headless {
                return Ok(()); // no-op per §8 idempotence law
            }
            config.headless = headless;
        }
        self.restart().await
    }

    pub async fn shutdown(&self) -> Result<(), McpError> {
        let mut guard = self.handle.write().await;
        if let Some(mut handle) = guard.take() {
            let _ = tokio::time::timeout(Duration::from_secs(3), handle.browser.close()).await;
            handle.handler_task.abort();
            let _ = std::fs::remove_dir_all(&handle.user_data_dir);
        }
        self.pages.clear();
        Ok(())
    }
}
