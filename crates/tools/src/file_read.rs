//! Read tool — file contents from the workspace.

use crate::args;
use async_trait::async_trait;
use opencrank_core::tool::{Tool, ToolOutcome, ToolParam};
use opencrank_security::path::{resolve_path, validate_path};
use std::path::PathBuf;
use tracing::debug;

/// Files beyond this many bytes are cut off with a marker.
const MAX_READ_BYTES: usize = 50_000;

pub struct ReadTool {
    workspace: PathBuf,
}

impl ReadTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Use this to examine files, \
         read documentation, or load instructions."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::string(
            "path",
            "Path to the file to read (relative to workspace)",
            true,
        )]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let path = match args::required_str(arguments, "path") {
            Ok(p) => p,
            Err(e) => return ToolOutcome::fail(e),
        };

        let full_path = resolve_path(path, &self.workspace);
        debug!(path = %full_path.display(), "Reading file");

        let full_path = match validate_path(&full_path, &[]) {
            Ok(p) => p,
            Err(_) => return ToolOutcome::fail(format!("Path not allowed: {path}")),
        };

        let mut content = match tokio::fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => return ToolOutcome::fail(format!("Cannot open file: {path} ({e})")),
        };

        if content.len() > MAX_READ_BYTES {
            let mut cut = MAX_READ_BYTES;
            while !content.is_char_boundary(cut) {
                cut -= 1;
            }
            content.truncate(cut);
            content.push_str("\n\n... [truncated, file too large] ...");
        }

        ToolOutcome::ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.txt"), "the contents").unwrap();

        let tool = ReadTool::new(dir.path());
        let outcome = tool.execute(&serde_json::json!({"path": "note.txt"})).await;
        assert!(outcome.success);
        assert_eq!(outcome.output, "the contents");
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadTool::new(dir.path());
        let outcome = tool.execute(&serde_json::json!({"path": "gone.txt"})).await;
        assert!(!outcome.success);
        assert!(outcome.error.contains("Cannot open file"));
    }

    #[tokio::test]
    async fn traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadTool::new(dir.path());
        let outcome = tool
            .execute(&serde_json::json!({"path": "../../etc/passwd"}))
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.contains("Path not allowed"));
    }

    #[tokio::test]
    async fn large_file_truncated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "a".repeat(60_000)).unwrap();

        let tool = ReadTool::new(dir.path());
        let outcome = tool.execute(&serde_json::json!({"path": "big.txt"})).await;
        assert!(outcome.success);
        assert!(outcome.output.len() < 60_000);
        assert!(outcome.output.ends_with("... [truncated, file too large] ..."));
    }

    #[tokio::test]
    async fn missing_path_param_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadTool::new(dir.path());
        let outcome = tool.execute(&serde_json::json!({})).await;
        assert!(!outcome.success);
        assert!(outcome.error.contains("Missing required parameter: path"));
    }
}
