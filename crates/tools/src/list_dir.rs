//! List-directory tool.

use crate::args;
use async_trait::async_trait;
use opencrank_core::tool::{Tool, ToolOutcome, ToolParam};
use opencrank_security::path::{resolve_path, validate_path};
use std::fmt::Write as _;
use std::path::PathBuf;

pub struct ListDirTool {
    workspace: PathBuf,
}

impl ListDirTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the contents of a directory."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::string(
            "path",
            "Path to the directory (relative to workspace)",
            false,
        )]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let path = args::optional_str(arguments, "path").unwrap_or(".");
        let full_path = resolve_path(path, &self.workspace);
        let full_path = match validate_path(&full_path, &[]) {
            Ok(p) => p,
            Err(_) => return ToolOutcome::fail(format!("Path not allowed: {path}")),
        };

        let mut read_dir = match tokio::fs::read_dir(&full_path).await {
            Ok(rd) => rd,
            Err(e) => return ToolOutcome::fail(format!("Cannot open directory: {path} ({e})")),
        };

        let mut names = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            match entry.metadata().await {
                Ok(meta) if meta.is_dir() => names.push(format!("{name}/")),
                Ok(meta) => names.push(format!("{name} ({} bytes)", meta.len())),
                Err(_) => names.push(name),
            }
        }
        names.sort();

        let mut out = format!("Contents of {path}:\n");
        for name in names {
            let _ = writeln!(out, "  {name}");
        }
        ToolOutcome::ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), "12345").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let tool = ListDirTool::new(dir.path());
        let outcome = tool.execute(&serde_json::json!({})).await;
        assert!(outcome.success);
        assert!(outcome.output.contains("file.txt (5 bytes)"));
        assert!(outcome.output.contains("sub/"));
    }

    #[tokio::test]
    async fn missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ListDirTool::new(dir.path());
        let outcome = tool.execute(&serde_json::json!({"path": "nope"})).await;
        assert!(!outcome.success);
        assert!(outcome.error.contains("Cannot open directory"));
    }
}
