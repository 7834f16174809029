//! Write tool — create or overwrite a file in the workspace.

use crate::args;
use async_trait::async_trait;
use opencrank_core::tool::{Tool, ToolOutcome, ToolParam};
use opencrank_security::path::{resolve_path, validate_path};
use std::path::PathBuf;
use tracing::debug;

pub struct WriteTool {
    workspace: PathBuf,
}

impl WriteTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file if it doesn't exist, overwrites if it does."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::string("path", "Path to the file (relative to workspace)", true),
            ToolParam::string("content", "Content to write to the file", true),
        ]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let path = match args::required_str(arguments, "path") {
            Ok(p) => p,
            Err(e) => return ToolOutcome::fail(e),
        };
        let content = match args::required_str(arguments, "content") {
            Ok(c) => c,
            Err(e) => return ToolOutcome::fail(e),
        };

        let full_path = resolve_path(path, &self.workspace);
        let full_path = match validate_path(&full_path, &[]) {
            Ok(p) => p,
            Err(_) => return ToolOutcome::fail(format!("Path not allowed: {path}")),
        };

        debug!(path = %full_path.display(), bytes = content.len(), "Writing file");

        if let Some(parent) = full_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutcome::fail(format!("Cannot create parent directory: {e}"));
            }
        }
        if let Err(e) = tokio::fs::write(&full_path, content).await {
            return ToolOutcome::fail(format!("Cannot open file for writing: {path} ({e})"));
        }

        ToolOutcome::ok(format!(
            "Successfully wrote {} bytes to {path}",
            content.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteTool::new(dir.path());

        let outcome = tool
            .execute(&serde_json::json!({"path": "out.txt", "content": "first"}))
            .await;
        assert!(outcome.success);
        assert!(outcome.output.contains("5 bytes"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "first"
        );

        tool.execute(&serde_json::json!({"path": "out.txt", "content": "second"}))
            .await;
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "second"
        );
    }

    #[tokio::test]
    async fn creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteTool::new(dir.path());
        let outcome = tool
            .execute(&serde_json::json!({"path": "deep/nested/file.md", "content": "x"}))
            .await;
        assert!(outcome.success);
        assert!(dir.path().join("deep/nested/file.md").exists());
    }

    #[tokio::test]
    async fn requires_both_params() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteTool::new(dir.path());

        let outcome = tool.execute(&serde_json::json!({"path": "a.txt"})).await;
        assert!(!outcome.success);
        assert!(outcome.error.contains("content"));

        let outcome = tool.execute(&serde_json::json!({"content": "x"})).await;
        assert!(!outcome.success);
        assert!(outcome.error.contains("path"));
    }

    #[tokio::test]
    async fn traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteTool::new(dir.path());
        let outcome = tool
            .execute(&serde_json::json!({"path": "../escape.txt", "content": "x"}))
            .await;
        assert!(!outcome.success);
    }
}
