//! Context-overflow recovery.
//!
//! Model providers report context overflow as free-text errors, so the
//! classifier here is a centralized substring heuristic over the
//! adapter's error message. Recovery first shrinks oversized tool
//! results in place, then falls back to rebuilding the history around
//! its first message and most recent user turn.

use opencrank_core::message::{Message, Role};
use tracing::{debug, info};

/// Tool-result bodies larger than this get truncated during recovery.
const LARGE_TOOL_RESULT_CHARS: usize = 10_000;

/// How much of a truncated tool result survives.
const TRUNCATED_KEEP_CHARS: usize = 2_000;

/// Classify a model error message as a context/token-limit failure.
///
/// Case-insensitive substring match over patterns observed from real
/// providers. Kept in one place so the heuristic can be tuned (or
/// overridden by an adapter-specific predicate) without touching the
/// loop.
pub fn is_token_limit_error(error: &str) -> bool {
    let lower = error.to_lowercase();

    (lower.contains("exceeds") && (lower.contains("context") || lower.contains("token")))
        || lower.contains("too long")
        || lower.contains("context length")
        || lower.contains("maximum context")
        || lower.contains("token limit")
        || lower.contains("context size")
}

/// Try to shrink the history so a retry can fit the context window.
/// Returns whether anything changed.
///
/// Strategy 1: truncate every `[TOOL_RESULT ...]` user turn over
/// 10,000 chars down to its first 2,000 chars, preserving the framing
/// tags. Strategy 2 (only when nothing was truncated and the history
/// has more than 6 messages): rebuild around the first message and the
/// most recent user turn, with role alternation enforced.
pub fn try_truncate_history(history: &mut Vec<Message>) -> bool {
    if history.len() < 3 {
        // Need at least the original user message plus some context
        return false;
    }

    info!(messages = history.len(), "Attempting to truncate history to fit context window");

    // Strategy 1: shrink large tool-result turns in place
    let mut truncated_something = false;
    for msg in history.iter_mut() {
        if msg.role != Role::User || !msg.content.contains("[TOOL_RESULT") {
            continue;
        }
        if msg.content.len() <= LARGE_TOOL_RESULT_CHARS {
            continue;
        }
        if let Some(replacement) = truncate_tool_result(&msg.content) {
            debug!(
                from = msg.content.len(),
                to = replacement.len(),
                "Truncated tool result"
            );
            msg.content = replacement;
            truncated_something = true;
        }
    }

    if truncated_something {
        info!("Truncated large tool results in history");
        return true;
    }

    // Strategy 2: rebuild around the first message and the recent tail
    if history.len() > 6 {
        let mut new_history = vec![history[0].clone()];

        if history[0].role == Role::User {
            new_history.push(Message::assistant(
                "[Earlier conversation context was truncated to fit context window.]",
            ));
        }

        // Walk back at most 4 messages looking for a user turn to
        // restart from
        let mut tail_start = history.len() - 1;
        for back in 1..=4usize.min(history.len() - 1) {
            let idx = history.len() - back;
            if history[idx].role == Role::User {
                tail_start = idx;
                break;
            }
        }

        // Append the tail, skipping any message that would repeat the
        // previous role — strict-alternation providers reject those.
        let mut last_role = new_history
            .last()
            .map(|m| m.role)
            .unwrap_or(Role::Assistant);
        for msg in &history[tail_start..] {
            if msg.role == last_role {
                continue;
            }
            last_role = msg.role;
            new_history.push(msg.clone());
        }

        info!(from = history.len(), to = new_history.len(), "Reduced history");
        *history = new_history;
        return true;
    }

    false
}

/// Rewrite one oversized tool-result body, keeping the open/close tags
/// and the first 2,000 chars of the body.
fn truncate_tool_result(content: &str) -> Option<String> {
    let result_start = content.find("[TOOL_RESULT")?;
    let result_end = content.find("[/TOOL_RESULT]")?;

    // Extract the tool name from the opening tag
    let tool_name = content[result_start..]
        .find("tool=")
        .map(|at| {
            let name_start = result_start + at + 5;
            let rest = &content[name_start..];
            let name_end = rest.find([' ', ']']).unwrap_or(rest.len());
            &rest[..name_end]
        })
        .unwrap_or("unknown");

    let body_start = match content[result_start..].find("]\n") {
        Some(at) => result_start + at + 2,
        None => result_start,
    };
    let body = &content[body_start..result_end];

    let mut out = format!(
        "[TOOL_RESULT tool={tool_name} success=true]\n\
         [Content truncated to fit context window - original was {} characters]\n",
        content.len()
    );
    if body.len() > TRUNCATED_KEEP_CHARS {
        let mut cut = TRUNCATED_KEEP_CHARS;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&body[..cut]);
        out.push_str("\n... [truncated] ...");
    } else {
        out.push_str(body);
    }
    out.push_str("\n[/TOOL_RESULT]");
    Some(out)
}
