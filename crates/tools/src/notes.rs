//! Memory notes on disk (`file_*`).
//!
//! Free-form markdown files under the jail: a default `MEMORY.md`,
//! arbitrary named files, and daily logs at `memory/YYYY-MM-DD.md`.

use crate::args;
use async_trait::async_trait;
use chrono::Local;
use opencrank_core::tool::{ParamKind, Tool, ToolOutcome, ToolParam};
use opencrank_security::path::{resolve_path, validate_path};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const DEFAULT_NOTES_FILE: &str = "MEMORY.md";

/// Subdirectory for daily files, relative to the notes root.
const DAILY_SUBDIR: &str = "memory";

fn daily_path(root: &Path) -> PathBuf {
    root.join(DAILY_SUBDIR)
        .join(format!("{}.md", Local::now().format("%Y-%m-%d")))
}

async fn write_note(path: &Path, content: &str, append: bool) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("Cannot create directory: {e}"))?;
    }
    if append {
        let mut existing = tokio::fs::read_to_string(path).await.unwrap_or_default();
        if !existing.is_empty() && !existing.ends_with('\n') {
            existing.push('\n');
        }
        existing.push_str(content);
        existing.push('\n');
        tokio::fs::write(path, existing)
            .await
            .map_err(|e| format!("Cannot write file: {e}"))
    } else {
        tokio::fs::write(path, format!("{content}\n"))
            .await
            .map_err(|e| format!("Cannot write file: {e}"))
    }
}

pub struct FileSaveTool {
    notes_root: PathBuf,
}

impl FileSaveTool {
    pub fn new(notes_root: impl Into<PathBuf>) -> Self {
        Self {
            notes_root: notes_root.into(),
        }
    }
}

#[async_trait]
impl Tool for FileSaveTool {
    fn name(&self) -> &str {
        "file_save"
    }

    fn description(&self) -> &str {
        "Write content to a memory file on disk. Use for markdown notes, \
         daily logs, or any text file in the memory workspace."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::string("content", "The content to write to the file", true),
            ToolParam::string("filename", "Optional filename (default: MEMORY.md)", false),
            ToolParam::new(
                "daily",
                ParamKind::Boolean,
                "If true, save to daily file (memory/YYYY-MM-DD.md)",
                false,
            ),
            ToolParam::new(
                "append",
                ParamKind::Boolean,
                "If true, append to existing file instead of overwriting",
                false,
            ),
        ]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let content = match args::required_str(arguments, "content") {
            Ok(c) if !c.is_empty() => c,
            Ok(_) => return ToolOutcome::fail("Content is required"),
            Err(e) => return ToolOutcome::fail(e),
        };

        let daily = args::flag(arguments, "daily");
        let append = args::flag(arguments, "append");
        let filename = args::optional_str(arguments, "filename").unwrap_or(DEFAULT_NOTES_FILE);

        let (path, append) = if daily {
            // Daily logs always accumulate
            (daily_path(&self.notes_root), true)
        } else {
            (resolve_path(filename, &self.notes_root), append)
        };

        let path = match validate_path(&path, &[]) {
            Ok(p) => p,
            Err(_) => return ToolOutcome::fail(format!("Path not allowed: {}", path.display())),
        };

        match write_note(&path, content, append).await {
            Ok(()) => ToolOutcome::ok("File saved successfully"),
            Err(e) => ToolOutcome::fail(format!("Failed to save file: {e}")),
        }
    }
}

pub struct FileGetTool {
    notes_root: PathBuf,
}

impl FileGetTool {
    pub fn new(notes_root: impl Into<PathBuf>) -> Self {
        Self {
            notes_root: notes_root.into(),
        }
    }
}

#[async_trait]
impl Tool for FileGetTool {
    fn name(&self) -> &str {
        "file_get"
    }

    fn description(&self) -> &str {
        "Read the full content of a specific memory file from disk."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::string(
            "path",
            "Path to the memory file (e.g., 'MEMORY.md' or 'memory/2024-01-15.md')",
            true,
        )]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let path = match args::required_str(arguments, "path") {
            Ok(p) => p,
            Err(e) => return ToolOutcome::fail(e),
        };

        let full_path = resolve_path(path, &self.notes_root);
        let full_path = match validate_path(&full_path, &[]) {
            Ok(p) => p,
            Err(_) => return ToolOutcome::fail(format!("Path not allowed: {path}")),
        };

        match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => ToolOutcome::ok(content),
            Err(e) => ToolOutcome::fail(format!("Cannot read memory file: {path} ({e})")),
        }
    }
}

pub struct FileListTool {
    notes_root: PathBuf,
}

impl FileListTool {
    pub fn new(notes_root: impl Into<PathBuf>) -> Self {
        Self {
            notes_root: notes_root.into(),
        }
    }
}

#[async_trait]
impl Tool for FileListTool {
    fn name(&self) -> &str {
        "file_list"
    }

    fn description(&self) -> &str {
        "List all memory files on disk in the workspace."
    }

    async fn execute(&self, _arguments: &serde_json::Value) -> ToolOutcome {
        let mut files = Vec::new();
        collect_markdown(&self.notes_root, Path::new(""), &mut files).await;
        collect_markdown(
            &self.notes_root.join(DAILY_SUBDIR),
            Path::new(DAILY_SUBDIR),
            &mut files,
        )
        .await;

        if files.is_empty() {
            return ToolOutcome::ok("No memory files.".to_string());
        }

        files.sort();
        let mut out = format!("{} memory file(s):\n", files.len());
        for file in files {
            let _ = writeln!(out, "  {file}");
        }
        ToolOutcome::ok(out)
    }
}

async fn collect_markdown(dir: &Path, prefix: &Path, out: &mut Vec<String>) {
    let Ok(mut read_dir) = tokio::fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = read_dir.next_entry().await {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(".md")
            && entry.metadata().await.map(|m| m.is_file()).unwrap_or(false)
        {
            out.push(prefix.join(name.as_ref()).to_string_lossy().into_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_get_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let save = FileSaveTool::new(dir.path());
        let get = FileGetTool::new(dir.path());

        let outcome = save
            .execute(&serde_json::json!({"content": "remember this"}))
            .await;
        assert!(outcome.success);

        let outcome = get.execute(&serde_json::json!({"path": "MEMORY.md"})).await;
        assert!(outcome.success);
        assert!(outcome.output.contains("remember this"));
    }

    #[tokio::test]
    async fn append_mode_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let save = FileSaveTool::new(dir.path());

        save.execute(&serde_json::json!({"content": "line one"})).await;
        save.execute(&serde_json::json!({"content": "line two", "append": true}))
            .await;

        let content = std::fs::read_to_string(dir.path().join("MEMORY.md")).unwrap();
        assert!(content.contains("line one"));
        assert!(content.contains("line two"));
    }

    #[tokio::test]
    async fn overwrite_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let save = FileSaveTool::new(dir.path());

        save.execute(&serde_json::json!({"content": "old"})).await;
        save.execute(&serde_json::json!({"content": "new"})).await;

        let content = std::fs::read_to_string(dir.path().join("MEMORY.md")).unwrap();
        assert!(!content.contains("old"));
        assert!(content.contains("new"));
    }

    #[tokio::test]
    async fn daily_file_lands_in_memory_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let save = FileSaveTool::new(dir.path());

        let outcome = save
            .execute(&serde_json::json!({"content": "today's note", "daily": true}))
            .await;
        assert!(outcome.success);

        let today = Local::now().format("%Y-%m-%d").to_string();
        let path = dir.path().join("memory").join(format!("{today}.md"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn list_spans_root_and_daily() {
        let dir = tempfile::tempdir().unwrap();
        let save = FileSaveTool::new(dir.path());
        let list = FileListTool::new(dir.path());

        save.execute(&serde_json::json!({"content": "a"})).await;
        save.execute(&serde_json::json!({"content": "b", "daily": true})).await;

        let outcome = list.execute(&serde_json::json!({})).await;
        assert!(outcome.success);
        assert!(outcome.output.contains("MEMORY.md"));
        assert!(outcome.output.contains("memory/"));
    }

    #[tokio::test]
    async fn empty_content_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let save = FileSaveTool::new(dir.path());
        let outcome = save.execute(&serde_json::json!({"content": ""})).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn get_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let get = FileGetTool::new(dir.path());
        let outcome = get.execute(&serde_json::json!({"path": "nope.md"})).await;
        assert!(!outcome.success);
    }
}
