//! `read_file` / `write_file` tools: every path argument is routed through
//! the Path Validator (D) before the filesystem is touched (§4.4, §10.5).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::{ErrorContext, McpError};
use crate::path_validator::PathPolicy;
use crate::protocol::ToolResult;
use crate::tool::Tool;

pub struct ReadFileTool {
    policy: Arc<PathPolicy>,
}

impl ReadFileTool {
    #[must_use]
    pub fn new(policy: Arc<PathPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file from disk, subject to the server's path access policy."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, McpError> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| McpError::InvalidParams("'path' must be a string".into()))?;
        let candidate = PathBuf::from(path);

        let decision = self.policy.validate(&candidate, None);
        if !decision.is_allowed() {
            return Ok(ToolResult::error(
                ErrorContext::new("read_file")
                    .detail(format!("'{path}': {}", decision.reason()))
                    .suggest("check --allowed-paths/--deny-paths and the working directory restriction")
                    .build(),
            ));
        }

        match tokio::fs::read_to_string(&candidate).await {
            Ok(contents) => Ok(ToolResult::ok_text(contents)),
            Err(e) => Ok(ToolResult::error(format!("failed to read '{path}': {e}"))),
        }
    }
}

pub struct WriteFileTool {
    policy: Arc<PathPolicy>,
}

impl WriteFileTool {
    #[must_use]
    pub fn new(policy: Arc<PathPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write UTF-8 text content to a file, subject to the server's path access policy and size cap."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, McpError> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| McpError::InvalidParams("'path' must be a string".into()))?;
        let content = args["content"]
            .as_str()
            .ok_or_else(|| McpError::InvalidParams("'content' must be a string".into()))?;
        let candidate = PathBuf::from(path);

        let decision = self
            .policy
            .validate(&candidate, Some(content.len() as u64));
        if !decision.is_allowed() {
            return Ok(ToolResult::error(
                ErrorContext::new("write_file")
                    .detail(format!("'{path}': {}", decision.reason()))
                    .suggest("check --allowed-paths/--deny-paths and --max-file-size")
                    .build(),
            ));
        }

        if let Some(parent) = candidate.parent()
            && !parent.as_os_str().is_empty()
        {
            let _ = tokio::fs::create_dir_all(parent).await;
        }

        match tokio::fs::write(&candidate, content).await {
            Ok(()) => Ok(ToolResult::ok_text(format!(
                "wrote {} bytes to '{path}'",
                content.len()
            ))),
            Err(e) => Ok(ToolResult::error(format!("failed to write '{path}': {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_in(dir: &std::path::Path) -> Arc<PathPolicy> {
        let mut p = PathPolicy::new(dir.to_path_buf());
        p.allowed_paths = vec![dir.to_path_buf()];
        Arc::new(p)
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = policy_in(tmp.path());
        let write_tool = WriteFileTool::new(policy.clone());
        let path = tmp.path().join("note.txt");

        let result = write_tool
            .execute(json!({"path": path.to_str().unwrap(), "content": "hello"}))
            .await
            .unwrap();
        assert!(!result.is_error);

        let read_tool = ReadFileTool::new(policy);
        let result = read_tool
            .execute(json!({"path": path.to_str().unwrap()}))
            .await
            .unwrap();
        assert_eq!(result.content[0].text.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn write_outside_allow_list_is_denied() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = policy_in(tmp.path());
        let write_tool = WriteFileTool::new(policy);
        let result = write_tool
            .execute(json!({"path": "/etc/not_allowed.txt", "content": "x"}))
            .await
            .unwrap();
        assert!(result.is_error);
    }
}
