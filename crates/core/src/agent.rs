//! Agent configuration and result types.

use serde::{Deserialize, Serialize};

/// Configuration for one agent's loop behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum tool call iterations before pausing
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Stop after this many consecutive model errors
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// Max chars of a tool result before it is chunked
    #[serde(default = "default_max_tool_result_size")]
    pub max_tool_result_size: usize,

    /// Automatically chunk oversized tool results
    #[serde(default = "default_true")]
    pub auto_chunk_large_results: bool,

    /// Chunk size in chars for large content (0 = derive from context_size)
    #[serde(default)]
    pub chunk_size: usize,

    /// Context size in tokens of the backing model (0 = unknown)
    #[serde(default)]
    pub context_size: usize,
}

fn default_max_iterations() -> u32 {
    30
}
fn default_max_consecutive_errors() -> u32 {
    5
}
fn default_max_tool_result_size() -> usize {
    15_000
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_consecutive_errors: default_max_consecutive_errors(),
            max_tool_result_size: default_max_tool_result_size(),
            auto_chunk_large_results: true,
            chunk_size: 0,
            context_size: 0,
        }
    }
}

impl AgentConfig {
    /// Effective chunk size for stored content.
    ///
    /// An explicit `chunk_size` wins. Otherwise derive ~10% of the
    /// model context window (tokens × 4 chars/token), floored at 2000.
    /// With no context size either, fall back to 8000.
    pub fn effective_chunk_size(&self) -> usize {
        if self.chunk_size > 0 {
            return self.chunk_size;
        }
        if self.context_size > 0 {
            let derived = (self.context_size * 4) / 10;
            return derived.max(2000);
        }
        8000
    }
}

/// The outcome of one agent run.
///
/// Exactly one of three states is externally visible:
/// `success && !paused`, `paused`, or `!success` with `error` set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,

    /// Final model response after all tool calls (non-tool text)
    pub final_response: String,

    /// Error message when the run failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Number of loop iterations used
    pub iterations: u32,

    /// Total tool calls executed
    pub tool_calls_made: u32,

    /// Unique names of tools that were called, in first-use order
    pub tools_used: Vec<String>,

    /// True if the run hit `max_iterations` and awaits continuation
    pub paused: bool,

    /// Message to show the user when paused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_message: Option<String>,
}

impl AgentResult {
    /// A run that failed before or during the loop.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}
