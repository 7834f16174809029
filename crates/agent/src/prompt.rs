//! The tools preamble rendered into the system prompt.
//!
//! This is the only place the invocation wire format is described to
//! the model, so the wording here and the parser must stay in sync.

use opencrank_core::tool::ToolRegistry;
use std::fmt::Write as _;

/// Render the tools section prepended to the system prompt.
/// Empty when no tools are registered.
pub fn build_tools_prompt(registry: &ToolRegistry) -> String {
    if registry.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str("## Available Tools\n\n");
    out.push_str("You MUST use tools to complete tasks. Use this JSON format:\n\n");
    out.push_str("```json\n");
    out.push_str("{\n");
    out.push_str("  \"tool\": \"TOOLNAME\",\n");
    out.push_str("  \"arguments\": {\n");
    out.push_str("    \"param\": \"value\"\n");
    out.push_str("  }\n");
    out.push_str("}\n");
    out.push_str("```\n\n");

    out.push_str("**FORMAT Rules:**\n");
    out.push_str("1. Start IMMEDIATELY with the JSON tool call - NO explanatory text before it\n");
    out.push_str("2. You can call multiple tools by emitting multiple JSON objects\n");
    out.push_str("3. You can explain AFTER the tool call(s), never before\n\n");

    out.push_str("### Large Content Handling\n");
    out.push_str(
        "When a tool returns content too large to fit in context, it will be automatically chunked.\n\
         You'll see a message like 'Stored as chunk_N with X chunks'. To access this content:\n\
         - Use 'content_chunk' with id and chunk number (0-based) to retrieve specific chunks\n\
         - Use 'content_search' with id and query to search within the content\n\
         This allows you to work with large files or command outputs.\n\n",
    );

    out.push_str("### Tools:\n\n");
    for tool in registry.iter() {
        let _ = writeln!(out, "**{}**: {}", tool.name(), tool.description());
        let params = tool.params();
        if !params.is_empty() {
            out.push_str("  Parameters:\n");
            for param in &params {
                let _ = write!(out, "  - `{}` ({}", param.name, param.kind.as_str());
                if param.required {
                    out.push_str(", required");
                }
                let _ = writeln!(out, "): {}", param.description);
            }
        }
        out.push('\n');
    }

    out
}
