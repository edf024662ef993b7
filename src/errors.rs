//! Error taxonomy and actionable error-message construction.
//!
//! `McpError` enumerates every kind described by the error taxonomy: protocol
//! errors (shaped into a JSON-RPC `error` object), tool errors and system
//! errors (shaped into a `ToolResult` with `is_error: true`), plus a catch-all
//! variant for the long tail of I/O/CDP/serde failures that don't need their
//! own typed variant.

use thiserror::Error;

/// A JSON-RPC protocol-level error code, per the envelope's standard set.
pub mod rpc_code {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

#[derive(Debug, Error)]
pub enum McpError {
    // --- Protocol errors (surfaced as JSON-RPC `error`) ---
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),

    // --- Tool errors (surfaced as ToolResult{is_error: true}) ---
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("access denied: {0}")]
    PermissionDenied(String),
    #[error("circuit open: {0}")]
    CircuitOpen(String),
    #[error("browser unavailable: {0}")]
    BrowserUnavailable(String),
    #[error("page not found: {0}")]
    PageNotFound(String),
    #[error("navigation failed: {0}")]
    NavigationFailed(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("remote CDP error: {0}")]
    Cdp(String),

    // --- System errors (cause shutdown) ---
    #[error("too many consecutive timeouts")]
    ConsecutiveTimeouts,
    #[error("unrecoverable browser restart failure: {0}")]
    BrowserRestartFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl McpError {
    /// Map the handful of variants that make a response impossible to shape
    /// as a tool result onto a JSON-RPC `(code, message)` pair.
    #[must_use]
    pub fn to_protocol_error(&self) -> Option<(i64, String)> {
        match self {
            McpError::ParseError(msg) => Some((rpc_code::PARSE_ERROR, msg.clone())),
            McpError::InvalidRequest(msg) => Some((rpc_code::INVALID_REQUEST, msg.clone())),
            McpError::MethodNotFound(msg) => Some((
                rpc_code::METHOD_NOT_FOUND,
                format!("Unknown method: {msg}"),
            )),
            McpError::InvalidParams(msg) => Some((rpc_code::INVALID_PARAMS, msg.clone())),
            _ => None,
        }
    }

    /// Whether this error class is retryable by the retry engine (B).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            McpError::Timeout(_) | McpError::Cdp(_) | McpError::NavigationFailed(_)
        )
    }
}

/// Builder for structured, actionable error messages.
///
/// Produces a multi-line message naming the operation that failed, what was
/// checked, and the concrete next step — per §7's "no bare 'no pages
/// available'" requirement.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    operation: String,
    details: Vec<String>,
    suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            details: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Build the formatted message:
    /// ```text
    /// Operation failed: {operation}
    ///
    /// Details:
    ///   - {detail}
    ///
    /// Suggestions:
    ///   - {suggestion}
    /// ```
    #[must_use]
    pub fn build(self) -> String {
        let mut msg = format!("Operation failed: {}\n", self.operation);

        if !self.details.is_empty() {
            msg.push_str("\nDetails:\n");
            for detail in &self.details {
                msg.push_str(&format!("  - {detail}\n"));
            }
        }

        if !self.suggestions.is_empty() {
            msg.push_str("\nSuggestions:\n");
            for suggestion in &self.suggestions {
                msg.push_str(&format!("  - {suggestion}\n"));
            }
        }

        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_mapping() {
        let err = McpError::MethodNotFound("not_a_tool".into());
        let (code, msg) = err.to_protocol_error().expect("should map");
        assert_eq!(code, rpc_code::METHOD_NOT_FOUND);
        assert!(msg.contains("not_a_tool"));
    }

    #[test]
    fn tool_errors_have_no_protocol_mapping() {
        let err = McpError::PermissionDenied("denied".into());
        assert!(err.to_protocol_error().is_none());
    }

    #[test]
    fn error_context_build_shape() {
        let msg = ErrorContext::new("navigate_page")
            .detail("page_id: page_3")
            .suggest("call open_page first")
            .build();
        assert!(msg.starts_with("Operation failed: navigate_page"));
        assert!(msg.contains("Details:"));
        assert!(msg.contains("page_id: page_3"));
        assert!(msg.contains("Suggestions:"));
        assert!(msg.contains("call open_page first"));
    }

    #[test]
    fn error_context_without_details_or_suggestions() {
        let msg = ErrorContext::new("health").build();
        assert_eq!(msg, "Operation failed: health\n");
    }
}
