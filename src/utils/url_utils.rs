//! URL validation helpers shared by the browser tools and the HTTP client tool.

/// Check whether a URL is an `http(s)` or `file:` URL suitable for page
/// navigation (§4.6's `open_page`/`navigate` accept "absolute URL or `file:`
/// path").
///
/// Rejects `data:`, `javascript:`, and `mailto:` URLs, which must never reach
/// the browser manager's `open_page`/`navigate` operations.
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:") {
        return false;
    }

    match url::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https" | "file"),
        Err(_) => false,
    }
}

/// Check whether a URL is an `http(s)` URL suitable for the outbound
/// `http_request` tool, which has no business dereferencing local files.
#[must_use]
pub fn is_valid_http_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    match url::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}
