//! Database-backed memory tools (`memory_*`).
//!
//! Structured entries live in the SQLite store; the disk-file notes
//! are a separate concern in [`crate::notes`].

use crate::args;
use async_trait::async_trait;
use opencrank_core::tool::{ParamKind, Tool, ToolOutcome, ToolParam};
use opencrank_memory::{MemoryEntry, MemoryStore};
use std::fmt::Write as _;
use std::sync::Arc;

pub struct MemorySaveTool {
    store: Arc<MemoryStore>,
}

impl MemorySaveTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemorySaveTool {
    fn name(&self) -> &str {
        "memory_save"
    }

    fn description(&self) -> &str {
        "Save a structured memory entry to the database."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::string("content", "The content to save", true),
            ToolParam::string("category", "Category: general, resume, fact, preference", false),
            ToolParam::new(
                "importance",
                ParamKind::Number,
                "Importance 1-10 (default: 5)",
                false,
            ),
            ToolParam::string("tags", "Comma-separated tags for search", false),
        ]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let content = match args::required_str(arguments, "content") {
            Ok(c) => c,
            Err(e) => return ToolOutcome::fail(e),
        };

        let mut entry = MemoryEntry::new(content);
        if let Some(category) = args::optional_str(arguments, "category") {
            entry.category = category.to_string();
        }
        if let Some(importance) = args::optional_i64(arguments, "importance") {
            entry.importance = importance.clamp(1, 10) as i32;
        }
        if let Some(tags) = args::optional_str(arguments, "tags") {
            entry.tags = tags.to_string();
        }

        match self.store.save_memory(&entry).await {
            Ok(id) => ToolOutcome::ok(format!("Memory saved (id: {id})")),
            Err(e) => ToolOutcome::fail(format!("Failed to save memory: {e}")),
        }
    }
}

pub struct MemorySearchTool {
    store: Arc<MemoryStore>,
}

impl MemorySearchTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search structured memory entries in the database."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::string("query", "Search query", true),
            ToolParam::new(
                "max_results",
                ParamKind::Number,
                "Maximum number of results (default: 10)",
                false,
            ),
            ToolParam::string("category", "Filter by category (optional)", false),
        ]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let query = match args::required_str(arguments, "query") {
            Ok(q) => q,
            Err(e) => return ToolOutcome::fail(e),
        };
        let max_results = args::optional_usize(arguments, "max_results").unwrap_or(10) as i64;
        let category = args::optional_str(arguments, "category");

        let hits = match self.store.search_memories(query, max_results, category).await {
            Ok(hits) => hits,
            Err(e) => return ToolOutcome::fail(format!("Search failed: {e}")),
        };

        if hits.is_empty() {
            return ToolOutcome::ok(format!("No memories found for '{query}'."));
        }

        let mut out = format!("Found {} memorie(s) for '{query}':\n\n", hits.len());
        for hit in &hits {
            let _ = writeln!(
                out,
                "- [{}] (importance {}) {}\n  id: {}",
                hit.entry.category, hit.entry.importance, hit.entry.content, hit.entry.id
            );
        }
        ToolOutcome::ok(out)
    }
}

pub struct MemoryListTool {
    store: Arc<MemoryStore>,
}

impl MemoryListTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryListTool {
    fn name(&self) -> &str {
        "memory_list"
    }

    fn description(&self) -> &str {
        "List structured memory entries from the database, most recently updated first."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::string("category", "Filter by category (empty = all)", false),
            ToolParam::new(
                "limit",
                ParamKind::Number,
                "Maximum entries to return (default: 100)",
                false,
            ),
        ]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let category = args::optional_str(arguments, "category").filter(|c| !c.is_empty());
        let limit = args::optional_usize(arguments, "limit").unwrap_or(100) as i64;

        let entries = match self.store.get_recent_memories(limit, category).await {
            Ok(entries) => entries,
            Err(e) => return ToolOutcome::fail(format!("List failed: {e}")),
        };

        if entries.is_empty() {
            return ToolOutcome::ok("No memories stored.".to_string());
        }

        let mut out = format!("{} memorie(s):\n\n", entries.len());
        for entry in &entries {
            let _ = writeln!(
                out,
                "- [{}] {}\n  id: {}",
                entry.category, entry.content, entry.id
            );
        }
        ToolOutcome::ok(out)
    }
}

pub struct MemoryDeleteTool {
    store: Arc<MemoryStore>,
}

impl MemoryDeleteTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryDeleteTool {
    fn name(&self) -> &str {
        "memory_delete"
    }

    fn description(&self) -> &str {
        "Delete a structured memory entry from the database."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::string("id", "The memory entry ID to delete", true)]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let id = match args::required_str(arguments, "id") {
            Ok(id) => id,
            Err(e) => return ToolOutcome::fail(e),
        };

        match self.store.delete_memory(id).await {
            Ok(true) => ToolOutcome::ok(format!("Memory {id} deleted.")),
            Ok(false) => ToolOutcome::fail(format!("No memory with id {id}.")),
            Err(e) => ToolOutcome::fail(format!("Delete failed: {e}")),
        }
    }
}
