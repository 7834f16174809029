//! ModelAdapter trait — the abstraction over LLM backends.
//!
//! An adapter knows how to send a conversation to a language model and
//! get a completion back. The agent loop calls `chat()` without knowing
//! which provider is behind it.
//!
//! Tool invocations travel inline: the model emits
//! `{"tool": "...", "arguments": {...}}` JSON objects inside its reply
//! text. Providers that return structured tool-call objects instead
//! (OpenAI-style `tool_calls`) normalize them into the inline format
//! with [`append_inline_tool_calls`] before the completion reaches the
//! agent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::message::Message;

/// Options for a single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Model override (adapter default when `None`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// System prompt sent alongside the history
    #[serde(default)]
    pub system_prompt: String,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Set by the context manager while generating a resume so the
    /// adapter layer does not recurse into another resume cycle.
    #[serde(default)]
    pub skip_context_management: bool,
}

fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: None,
            system_prompt: String::new(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            skip_context_management: false,
        }
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// A completed (non-streaming) model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text, with any structured tool calls already
    /// normalized into the inline JSON invocation format.
    pub content: String,

    /// Why generation stopped ("stop", "length", "tool_use", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Token usage statistics, when the provider reports them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A structured tool call as returned by OpenAI-style providers:
/// `function { name, arguments }` where `arguments` is a JSON string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawToolCall {
    pub name: String,
    pub arguments: String,
}

/// Normalize structured tool calls into the inline invocation format.
///
/// Appends one `{"tool": "<name>", "arguments": {...}}` object per call
/// after the reply text. Argument strings that fail to parse as JSON
/// are carried through as strings; the agent's tolerant parser handles
/// them downstream.
pub fn append_inline_tool_calls(content: &str, calls: &[RawToolCall]) -> String {
    if calls.is_empty() {
        return content.to_string();
    }

    let mut out = content.to_string();
    for call in calls {
        let arguments: serde_json::Value = serde_json::from_str(&call.arguments)
            .unwrap_or_else(|_| serde_json::Value::String(call.arguments.clone()));
        let inline = serde_json::json!({
            "tool": call.name,
            "arguments": arguments,
        });
        if !out.is_empty() {
            out.push('\n');
        }
        // json! output of a map is always serializable
        out.push_str(&inline.to_string());
    }
    out
}

/// The model adapter contract consumed by the agent loop.
///
/// Implementations live outside this workspace (provider plugins); the
/// test suites use scripted mocks.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// A human-readable name for this adapter (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Whether the adapter has everything it needs (API key, endpoint).
    /// The agent fails fast, before mutating history, when this is false.
    fn is_configured(&self) -> bool {
        true
    }

    /// Send the conversation and get a completion.
    async fn chat(
        &self,
        history: &[Message],
        options: &CompletionOptions,
    ) -> std::result::Result<Completion, ModelError>;
}
