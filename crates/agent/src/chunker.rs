//! In-memory store for content too large to feed the model directly.
//!
//! Oversized tool outputs are stored whole and addressed by an opaque
//! `chunk_<n>` handle; the model pages through fixed-size slices with
//! the `content_chunk` tool and locates material with `content_search`.
//! Stored content is immutable and lives until removed or cleared;
//! handles are process-bounded and not cryptographic.
//!
//! Chunk boundaries are byte offsets rounded down to the nearest UTF-8
//! codepoint boundary, fixed at store time. For ASCII content the chunk
//! count equals `ceil(len / chunk_size)`.

use crate::html::strip_html;
use regex::RegexBuilder;
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::debug;

/// Fallback chunk size when neither the store call nor the chunker
/// configuration provides one.
const DEFAULT_CHUNK_SIZE: usize = 8000;

/// Cap on matches reported by a single search.
const MAX_SEARCH_MATCHES: usize = 20;

/// One stored piece of content and its precomputed chunk boundaries.
#[derive(Debug, Clone)]
pub struct ChunkedContent {
    pub id: String,
    pub full_content: String,
    /// Where this came from (tool name, URL, ...)
    pub source: String,
    pub chunk_size: usize,
    /// Byte offsets; `boundaries[i]..boundaries[i+1]` is chunk `i`
    boundaries: Vec<usize>,
}

impl ChunkedContent {
    pub fn total_chunks(&self) -> usize {
        self.boundaries.len() - 1
    }

    fn chunk_slice(&self, index: usize) -> &str {
        &self.full_content[self.boundaries[index]..self.boundaries[index + 1]]
    }

    /// Which chunk a byte position falls in.
    fn chunk_of(&self, pos: usize) -> usize {
        match self.boundaries.binary_search(&pos) {
            Ok(i) => i.min(self.total_chunks().saturating_sub(1)),
            Err(i) => i - 1,
        }
    }
}

/// The in-memory content store.
pub struct ContentChunker {
    storage: HashMap<String, ChunkedContent>,
    next_id: u64,
    /// Configured default chunk size; 0 = use [`DEFAULT_CHUNK_SIZE`]
    default_chunk_size: usize,
}

impl ContentChunker {
    pub fn new() -> Self {
        Self {
            storage: HashMap::new(),
            next_id: 1,
            default_chunk_size: 0,
        }
    }

    /// A chunker whose `store(..., chunk_size=0)` calls use `size`.
    pub fn with_default_chunk_size(size: usize) -> Self {
        Self {
            default_chunk_size: size,
            ..Self::new()
        }
    }

    /// Store content and return its handle.
    ///
    /// `chunk_size = 0` means: use the configured default if set,
    /// else 8000.
    pub fn store(&mut self, content: impl Into<String>, source: impl Into<String>, chunk_size: usize) -> String {
        let content = content.into();
        let source = source.into();
        let chunk_size = if chunk_size > 0 {
            chunk_size
        } else if self.default_chunk_size > 0 {
            self.default_chunk_size
        } else {
            DEFAULT_CHUNK_SIZE
        };

        let id = format!("chunk_{}", self.next_id);
        self.next_id += 1;

        let boundaries = compute_boundaries(&content, chunk_size);
        debug!(
            id = %id,
            source = %source,
            bytes = content.len(),
            chunks = boundaries.len() - 1,
            "Stored chunked content"
        );

        self.storage.insert(
            id.clone(),
            ChunkedContent {
                id: id.clone(),
                full_content: content,
                source,
                chunk_size,
                boundaries,
            },
        );
        id
    }

    /// Retrieve one framed chunk. Errors come back as readable strings
    /// since the consumer is the model, not the host.
    pub fn get_chunk(&self, id: &str, index: usize, clean_html: bool) -> String {
        let Some(cc) = self.storage.get(id) else {
            return format!("Error: Content ID '{id}' not found.");
        };
        if index >= cc.total_chunks() {
            return format!(
                "Error: Chunk index {index} out of range. Total chunks: {}",
                cc.total_chunks()
            );
        }

        let slice = cc.chunk_slice(index);
        let body = if clean_html {
            strip_html(slice)
        } else {
            slice.to_string()
        };

        let mut out = format!(
            "[Chunk {}/{} from {}]\n{}",
            index + 1,
            cc.total_chunks(),
            cc.source,
            body
        );
        if index + 1 < cc.total_chunks() {
            let _ = write!(
                out,
                "\n\n[Use content_chunk tool with id=\"{id}\" and chunk={} for next chunk]",
                index + 1
            );
        } else {
            out.push_str("\n\n[End of content]");
        }
        out
    }

    /// Summary line for a stored id.
    pub fn info(&self, id: &str) -> String {
        let Some(cc) = self.storage.get(id) else {
            return format!("Content ID '{id}' not found.");
        };
        format!(
            "Content ID: {}\nSource: {}\nTotal size: {} characters\nTotal chunks: {} (each ~{} chars)\n",
            cc.id,
            cc.source,
            cc.full_content.len(),
            cc.total_chunks(),
            cc.chunk_size
        )
    }

    /// Search one stored content, grouping matches by the chunk index
    /// they fall in. Case-insensitive; with `use_regex` the query is a
    /// regex and an invalid pattern is reported distinctly.
    pub fn search_with_chunks(
        &self,
        id: &str,
        query: &str,
        context_chars: usize,
        use_regex: bool,
    ) -> String {
        let Some(cc) = self.storage.get(id) else {
            return format!("Content ID '{id}' not found.");
        };

        let matches = match find_matches(&cc.full_content, query, use_regex) {
            Ok(m) => m,
            Err(err) => return err,
        };
        if matches.is_empty() {
            return format!("No matches found for '{query}' in content.");
        }

        let mut out = format!(
            "Found {} match(es) for '{query}' in '{id}' (source: {}):\n\n",
            matches.len(),
            cc.source
        );
        render_grouped_matches(&mut out, cc, &matches, context_chars);
        let _ = write!(
            out,
            "Use content_chunk with id=\"{id}\" and the chunk number above to read around a match."
        );
        out
    }

    /// The same search across every stored id.
    pub fn search_all_chunks(&self, query: &str, context_chars: usize, use_regex: bool) -> String {
        if self.storage.is_empty() {
            return "No content stored.".to_string();
        }

        // Deterministic order for stable output
        let mut ids: Vec<&String> = self.storage.keys().collect();
        ids.sort();

        let mut out = String::new();
        let mut total = 0usize;
        for id in ids {
            let cc = &self.storage[id];
            let matches = match find_matches(&cc.full_content, query, use_regex) {
                Ok(m) => m,
                Err(err) => return err,
            };
            if matches.is_empty() {
                continue;
            }
            total += matches.len();
            let _ = writeln!(
                out,
                "=== '{id}' (source: {}) — {} match(es) ===",
                cc.source,
                matches.len()
            );
            render_grouped_matches(&mut out, cc, &matches, context_chars);
        }

        if total == 0 {
            return format!("No matches found for '{query}' in any stored content.");
        }
        format!("Found {total} match(es) for '{query}' across stored content:\n\n{out}")
    }

    pub fn has(&self, id: &str) -> bool {
        self.storage.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) {
        self.storage.remove(id);
    }

    pub fn clear(&mut self) {
        self.storage.clear();
        debug!("Cleared all stored content");
    }

    /// Total chunks for an id; 0 when unknown.
    pub fn total_chunks(&self, id: &str) -> usize {
        self.storage.get(id).map_or(0, |cc| cc.total_chunks())
    }
}

impl Default for ContentChunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte offsets of chunk boundaries, each rounded down to a codepoint
/// boundary. Always starts at 0; `boundaries.len() - 1` is the chunk
/// count (0 for empty content).
fn compute_boundaries(content: &str, chunk_size: usize) -> Vec<usize> {
    let len = content.len();
    let mut boundaries = vec![0];
    let mut cur = 0;
    while cur < len {
        let mut next = (cur + chunk_size).min(len);
        while next > cur && !content.is_char_boundary(next) {
            next -= 1;
        }
        if next == cur {
            // chunk_size smaller than one codepoint; take the whole char
            next = cur + 1;
            while next < len && !content.is_char_boundary(next) {
                next += 1;
            }
        }
        boundaries.push(next);
        cur = next;
    }
    boundaries
}

/// `(byte position, match length)` pairs, capped at
/// [`MAX_SEARCH_MATCHES`].
fn find_matches(content: &str, query: &str, use_regex: bool) -> Result<Vec<(usize, usize)>, String> {
    if use_regex {
        let re = RegexBuilder::new(query)
            .case_insensitive(true)
            .build()
            .map_err(|e| format!("Error: Invalid regex pattern '{query}': {e}"))?;
        return Ok(re
            .find_iter(content)
            .take(MAX_SEARCH_MATCHES)
            .map(|m| (m.start(), m.len()))
            .collect());
    }

    if query.is_empty() {
        return Ok(Vec::new());
    }

    // Plain search is ASCII-case-insensitive over the raw bytes so
    // match positions index the original content directly.
    let haystack = content.as_bytes();
    let needle = query.as_bytes();
    let mut matches = Vec::new();
    let mut i = 0;
    while i + needle.len() <= haystack.len() && matches.len() < MAX_SEARCH_MATCHES {
        if haystack[i..i + needle.len()].eq_ignore_ascii_case(needle) {
            matches.push((i, needle.len()));
            i += needle.len();
        } else {
            i += 1;
        }
    }
    Ok(matches)
}

fn render_grouped_matches(
    out: &mut String,
    cc: &ChunkedContent,
    matches: &[(usize, usize)],
    context_chars: usize,
) {
    let mut current_chunk = usize::MAX;
    for (i, &(pos, len)) in matches.iter().enumerate() {
        let chunk = cc.chunk_of(pos);
        if chunk != current_chunk {
            let _ = writeln!(out, "--- In chunk {chunk} ---");
            current_chunk = chunk;
        }

        let mut start = pos.saturating_sub(context_chars);
        while !cc.full_content.is_char_boundary(start) {
            start -= 1;
        }
        let mut end = (pos + len + context_chars).min(cc.full_content.len());
        while !cc.full_content.is_char_boundary(end) {
            end += 1;
        }

        let _ = writeln!(out, "Match {} (position {pos}):", i + 1);
        if start > 0 {
            out.push_str("...");
        }
        out.push_str(&cc.full_content[start..end]);
        if end < cc.full_content.len() {
            out.push_str("...");
        }
        out.push_str("\n\n");
    }
}
