//! `http_request` tool: outbound HTTP client gated by the network circuit
//! breaker (§10.5). The breaker gate itself lives in the tool envelope (G);
//! this tool only needs to report `uses_network() == true`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::McpError;
use crate::protocol::ToolResult;
use crate::retry::{retry_with_backoff, RetryStrategy};
use crate::tool::Tool;

pub struct HttpRequestTool {
    client: reqwest::Client,
}

impl HttpRequestTool {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http_request"
    }

    fn description(&self) -> &str {
        "Issue an outbound HTTP request (GET/POST/PUT/DELETE/PATCH) and return status, headers, and body."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "method": {"type": "string"},
                "url": {"type": "string"},
                "headers": {"type": "object"},
                "body": {"type": "string"}
            },
            "required": ["method", "url"]
        })
    }

    fn uses_network(&self) -> bool {
        true
    }

    fn deadline(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, McpError> {
        let method_str = args["method"]
            .as_str()
            .ok_or_else(|| McpError::InvalidParams("'method' must be a string".into()))?;
        let url = args["url"]
            .as_str()
            .ok_or_else(|| McpError::InvalidParams("'url' must be a string".into()))?;
        let method = reqwest::Method::from_bytes(method_str.to_uppercase().as_bytes())
            .map_err(|_| McpError::InvalidParams(format!("unsupported HTTP method '{method_str}'")))?;
        if !crate::utils::is_valid_http_url(url) {
            return Ok(ToolResult::error(format!(
                "'{url}' is not a valid http(s) URL"
            )));
        }

        let headers: Vec<(String, String)> = args["headers"]
            .as_object()
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let body = args["body"].as_str().map(str::to_string);

        let strategy = RetryStrategy::network_operation();
        let client = self.client.clone();
        let cancel = tokio_util::sync::CancellationToken::new();

        let result = retry_with_backoff(&strategy, cancel, "http_request", || {
            let client = client.clone();
            let method = method.clone();
            let url = url.to_string();
            let headers = headers.clone();
            let body = body.clone();
            async move {
                let mut req = client.request(method, &url);
                for (k, v) in &headers {
                    req = req.header(k, v);
                }
                if let Some(b) = body {
                    req = req.body(b);
                }
                let response = req
                    .send()
                    .await
                    .map_err(|e| McpError::Timeout(format!("http_request to {url} failed: {e}")))?;
                let status = response.status().as_u16();
                let text = response
                    .text()
                    .await
                    .map_err(|e| McpError::Other(anyhow::anyhow!("failed to read response body: {e}")))?;
                Ok((status, text))
            }
        })
        .await;

        match result {
            Ok((status, text)) => Ok(ToolResult::ok_text(format!("HTTP {status}\n\n{text}"))),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}
