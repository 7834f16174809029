//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! execute shell commands, read/write files, query memory, page through
//! chunked content. Each tool declares a flat parameter list that the
//! agent renders into the tools preamble, and an async executor over a
//! loosely-typed JSON argument object.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamKind {
    /// The type name shown to the model in the tools preamble.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Array => "array",
            ParamKind::Object => "object",
        }
    }
}

/// Schema for one tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ToolParam {
    pub fn new(
        name: impl Into<String>,
        kind: ParamKind,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required,
            default: None,
        }
    }

    /// Convenience for the most common parameter shape.
    pub fn string(name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        Self::new(name, ParamKind::String, description, required)
    }
}

/// The result of a tool execution.
///
/// `should_continue = false` signals the agent loop to end the run
/// successfully after this iteration (the `stop` variant of the
/// contract). Failures carry their message in `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    pub output: String,
    pub error: String,
    pub should_continue: bool,
}

impl ToolOutcome {
    /// A successful result; the loop continues.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: String::new(),
            should_continue: true,
        }
    }

    /// A successful result that asks the loop to stop.
    pub fn stop(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: String::new(),
            should_continue: false,
        }
    }

    /// A failed result; surfaced to the model, not the user.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
            should_continue: true,
        }
    }
}

/// The core Tool trait.
///
/// Executors are referentially transparent from the agent's point of
/// view: a function from a parsed argument object to an outcome. Any
/// internal error must be converted into `ToolOutcome::fail` rather
/// than panicking.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "shell", "content_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (rendered into the preamble).
    fn description(&self) -> &str;

    /// The declared parameter list.
    fn params(&self) -> Vec<ToolParam> {
        Vec::new()
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: &serde_json::Value) -> ToolOutcome;
}

/// A parsed tool invocation extracted from an assistant reply.
///
/// `span` is the byte range `[start, end)` of the JSON object in the
/// producing text, so the agent can later cut tool calls out and keep
/// the surrounding prose as the visible response.
#[derive(Debug, Clone)]
pub struct ParsedToolCall {
    pub tool_name: String,
    pub args: serde_json::Value,
    /// Raw JSON text of the candidate, before any repair
    pub raw: String,
    pub span: (usize, usize),
    pub valid: bool,
    pub parse_error: Option<String>,
}

impl ParsedToolCall {
    /// Canonical dedup key: tool name + serialized arguments.
    /// Invalid calls key on their raw text instead.
    pub fn dedup_key(&self) -> String {
        if self.valid {
            format!("{}:{}", self.tool_name, self.args)
        } else {
            format!("{}:{}", self.tool_name, self.raw)
        }
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to build the tools preamble and to look up
/// executors when the model requests them. Registration replaces any
/// prior entry with the same name. A `BTreeMap` keeps preamble order
/// deterministic.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// All registered tool names, in preamble order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Iterate tools in preamble order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn params(&self) -> Vec<ToolParam> {
            vec![ToolParam::string("text", "Text to echo", true)]
        }
        async fn execute(&self, args: &serde_json::Value) -> ToolOutcome {
            ToolOutcome::ok(args["text"].as_str().unwrap_or(""))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_names_sorted() {
        struct Named(&'static str);
        #[async_trait]
        impl Tool for Named {
            fn name(&self) -> &str {
                self.0
            }
            fn description(&self) -> &str {
                ""
            }
            async fn execute(&self, _args: &serde_json::Value) -> ToolOutcome {
                ToolOutcome::ok("")
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Named("zeta")));
        registry.register(Arc::new(Named("alpha")));
        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn echo_tool_executes() {
        let tool = EchoTool;
        let result = tool.execute(&serde_json::json!({"text": "hi"})).await;
        assert!(result.success);
        assert_eq!(result.output, "hi");
    }

    #[test]
    fn outcome_constructors() {
        let ok = ToolOutcome::ok("done");
        assert!(ok.success && ok.should_continue);

        let stop = ToolOutcome::stop("final");
        assert!(stop.success && !stop.should_continue);

        let fail = ToolOutcome::fail("boom");
        assert!(!fail.success && fail.should_continue);
        assert_eq!(fail.error, "boom");
    }

    #[test]
    fn dedup_key_uses_args_for_valid_calls() {
        let call = ParsedToolCall {
            tool_name: "echo".into(),
            args: serde_json::json!({"text": "x"}),
            raw: "ignored".into(),
            span: (0, 0),
            valid: true,
            parse_error: None,
        };
        assert_eq!(call.dedup_key(), r#"echo:{"text":"x"}"#);
    }
}
