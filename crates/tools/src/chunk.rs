//! Tools for paging and searching chunked content.
//!
//! These read from the agent's [`ContentChunker`], which the loop
//! fills when a tool result exceeds the configured size.

use crate::args;
use async_trait::async_trait;
use opencrank_agent::ContentChunker;
use opencrank_core::tool::{ParamKind, Tool, ToolOutcome, ToolParam};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Default context window around each search match, in characters.
const DEFAULT_SEARCH_CONTEXT: usize = 300;

pub struct ContentChunkTool {
    chunker: Arc<Mutex<ContentChunker>>,
}

impl ContentChunkTool {
    pub fn new(chunker: Arc<Mutex<ContentChunker>>) -> Self {
        Self { chunker }
    }
}

#[async_trait]
impl Tool for ContentChunkTool {
    fn name(&self) -> &str {
        "content_chunk"
    }

    fn description(&self) -> &str {
        "Load one chunk of large content that was stored due to size limits. \
         Use 'content_search' first to find which chunks contain the information \
         you need, then load specific chunks with this tool."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::string("id", "The content ID (e.g., 'chunk_1')", true),
            ToolParam::new("chunk", ParamKind::Number, "Chunk index (0-based)", true),
            ToolParam::new(
                "clean_html",
                ParamKind::Boolean,
                "Strip HTML tags except links and images (default: false)",
                false,
            ),
        ]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let id = match args::required_str(arguments, "id") {
            Ok(id) => id,
            Err(e) => return ToolOutcome::fail(e),
        };
        let chunk_index = args::optional_usize(arguments, "chunk").unwrap_or(0);
        let clean_html = args::flag(arguments, "clean_html");

        debug!(id = %id, chunk = chunk_index, clean_html, "Retrieving chunk");

        let chunker = self.chunker.lock().expect("chunker poisoned");
        if !chunker.has(id) {
            return ToolOutcome::fail(format!(
                "Content ID '{id}' not found. It may have expired or been cleared."
            ));
        }
        ToolOutcome::ok(chunker.get_chunk(id, chunk_index, clean_html))
    }
}

pub struct ContentSearchTool {
    chunker: Arc<Mutex<ContentChunker>>,
}

impl ContentSearchTool {
    pub fn new(chunker: Arc<Mutex<ContentChunker>>) -> Self {
        Self { chunker }
    }
}

#[async_trait]
impl Tool for ContentSearchTool {
    fn name(&self) -> &str {
        "content_search"
    }

    fn description(&self) -> &str {
        "Search for text within large stored content. Returns chunk indexes where \
         matches were found along with excerpts. Supports regex patterns. If 'id' \
         is omitted, searches across ALL stored chunks."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::string(
                "id",
                "The content ID (e.g., 'chunk_1'). If omitted, searches all stored chunks.",
                false,
            ),
            ToolParam::string(
                "query",
                "Text or regex pattern to search for (case-insensitive)",
                true,
            ),
            ToolParam::new(
                "context",
                ParamKind::Number,
                "Characters of context around each match (default: 300)",
                false,
            ),
            ToolParam::new(
                "use_regex",
                ParamKind::Boolean,
                "Treat query as a regex pattern (default: false)",
                false,
            ),
        ]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let query = match args::required_str(arguments, "query") {
            Ok(q) => q,
            Err(e) => return ToolOutcome::fail(e),
        };
        let context = args::optional_usize(arguments, "context").unwrap_or(DEFAULT_SEARCH_CONTEXT);
        let use_regex = args::flag(arguments, "use_regex");

        let chunker = self.chunker.lock().expect("chunker poisoned");
        match args::optional_str(arguments, "id") {
            Some(id) => {
                debug!(id = %id, query = %query, use_regex, "Searching content");
                if !chunker.has(id) {
                    return ToolOutcome::fail(format!(
                        "Content ID '{id}' not found. It may have expired or been cleared."
                    ));
                }
                ToolOutcome::ok(chunker.search_with_chunks(id, query, context, use_regex))
            }
            None => {
                debug!(query = %query, use_regex, "Searching all content");
                ToolOutcome::ok(chunker.search_all_chunks(query, context, use_regex))
            }
        }
    }
}
