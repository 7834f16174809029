//! Tolerant parsing of inline JSON tool calls.
//!
//! Models emit `{"tool": "<name>", "arguments": {...}}` objects
//! anywhere inside their reply text. This module finds them, repairs
//! the common breakages (code fences, trailing commas, unescaped
//! quotes inside shell-command values), and records precise byte spans
//! so the loop can later extract the non-tool prose.
//!
//! The multi-pass recovery is a shim over real model failure modes,
//! not a contract; it lives entirely behind this module so the
//! heuristics can evolve without touching the loop.

use opencrank_core::tool::{ParsedToolCall, ToolParam};
use serde_json::Value;
use tracing::{debug, warn};

/// How far past a `{` to look for the `"tool"` key before bothering
/// with a full brace match.
const TOOL_KEY_LOOKAHEAD: usize = 200;

/// Parse all tool calls embedded in an assistant reply, in source
/// order. Never fails: malformed candidates become invalid calls with
/// `parse_error` populated.
pub fn parse_tool_calls(response: &str) -> Vec<ParsedToolCall> {
    let bytes = response.as_bytes();
    let mut calls = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let Some(brace_start) = find_byte(bytes, b'{', pos) else {
            break;
        };

        // Quick check: does the area after this brace mention "tool"?
        let lookahead_end = (brace_start + TOOL_KEY_LOOKAHEAD).min(bytes.len());
        if !contains_subslice(&bytes[brace_start..lookahead_end], b"\"tool\"") {
            pos = brace_start + 1;
            continue;
        }

        let Some(scan_end) = match_closing_brace(bytes, brace_start) else {
            // Unmatched braces, skip
            pos = brace_start + 1;
            continue;
        };

        let candidate = &response[brace_start..scan_end];
        debug!(start = brace_start, len = candidate.len(), "Tool-call candidate");

        let parsed = match tolerant_parse(candidate) {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "Candidate JSON parse failed");
                pos = brace_start + 1;
                continue;
            }
        };

        let Some(object) = parsed.as_object() else {
            pos = scan_end;
            continue;
        };
        let tool_name = match object.get("tool").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                pos = scan_end;
                continue;
            }
        };

        let mut call = ParsedToolCall {
            tool_name: tool_name.clone(),
            args: Value::Object(serde_json::Map::new()),
            raw: candidate.to_string(),
            span: (brace_start, scan_end),
            valid: true,
            parse_error: None,
        };

        match object.get("arguments") {
            Some(Value::Object(args)) => {
                call.args = Value::Object(args.clone());
            }
            Some(Value::String(args_str)) => {
                // Some models put a JSON string in arguments; re-parse it
                match tolerant_parse(args_str) {
                    Ok(Value::Object(args)) => {
                        call.args = Value::Object(args);
                        debug!(tool = %tool_name, "Parsed stringified arguments");
                    }
                    _ => {
                        call.valid = false;
                        call.parse_error = Some(format!(
                            "Arguments field is a string but not valid JSON: {args_str}"
                        ));
                        warn!(tool = %tool_name, "Failed to parse stringified arguments");
                    }
                }
            }
            // No arguments field is fine for parameterless tools
            _ => {}
        }

        debug!(tool = %tool_name, valid = call.valid, "Parsed tool call");
        calls.push(call);
        pos = scan_end;
    }

    calls
}

/// Multi-pass JSON parse: direct, then fence/comma cleanup, then
/// unescaped-quote repair. Returns the last parse error on failure.
pub fn tolerant_parse(raw: &str) -> Result<Value, String> {
    let mut last_error = match serde_json::from_str(raw) {
        Ok(value) => return Ok(value),
        Err(e) => e.to_string(),
    };

    // Pass one: strip code fences, isolate the outermost object,
    // drop trailing commas.
    let cleaned = raw.replace("```", "");
    let cleaned = cleaned.trim();
    let (Some(first), Some(last)) = (cleaned.find('{'), cleaned.rfind('}')) else {
        return Err(last_error);
    };
    if last <= first {
        return Err(last_error);
    }
    let sanitized = remove_trailing_commas(&cleaned[first..=last]);

    match serde_json::from_str(&sanitized) {
        Ok(value) => return Ok(value),
        Err(e) => last_error = e.to_string(),
    }

    // Pass two: escape raw quotes inside value strings. Repairs the
    // common failure of shell-command values containing `"` characters.
    let fixed = escape_unescaped_value_quotes(&sanitized);
    match serde_json::from_str(&fixed) {
        Ok(value) => {
            debug!("JSON recovery: auto-escaped internal quotes");
            Ok(value)
        }
        Err(_) => Err(last_error),
    }
}

fn remove_trailing_commas(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b',' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j < bytes.len() && (bytes[j] == b'}' || bytes[j] == b']') {
                i += 1;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    // Only ASCII bytes were removed, so the result stays valid UTF-8
    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

/// Walk the text tracking string/key state and escape any `"` inside a
/// *value* string whose next significant character is not `,`, `}`, or
/// `]` — those quotes cannot be closers, so they must be content.
fn escape_unescaped_value_quotes(input: &str) -> String {
    let mut bytes: Vec<u8> = input.as_bytes().to_vec();
    let mut in_string = false;
    let mut in_key = false;
    let mut escape_next = false;
    let mut colon_pos: Option<usize> = None;

    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if escape_next {
            escape_next = false;
            i += 1;
            continue;
        }
        match c {
            b'\\' => {
                escape_next = true;
            }
            b'"' => {
                if !in_string {
                    in_string = true;
                    in_key = match colon_pos {
                        Some(cp) => i < cp,
                        None => true,
                    };
                } else {
                    if !in_key {
                        let mut next = i + 1;
                        while next < bytes.len() && bytes[next].is_ascii_whitespace() {
                            next += 1;
                        }
                        if next < bytes.len()
                            && !matches!(bytes[next], b',' | b'}' | b']')
                        {
                            bytes.insert(i, b'\\');
                            i += 2;
                            continue;
                        }
                    }
                    in_string = false;
                    in_key = false;
                }
            }
            b':' if !in_string => {
                colon_pos = Some(i);
            }
            _ => {}
        }
        i += 1;
    }

    String::from_utf8(bytes).unwrap_or_else(|_| input.to_string())
}

/// Schema-directed argument recovery for calls whose JSON never parsed.
///
/// Scans the raw candidate text for each declared parameter name
/// (quoted, single-quoted, or bare identifier followed by `:`) and
/// extracts the adjacent quoted or bare value. Accepts the result when
/// at least one value was found and no required parameter is missing.
/// As a last resort, a single-parameter tool takes the entire raw
/// content as that parameter's value.
pub fn recover_args(
    params: &[ToolParam],
    raw: &str,
) -> Result<serde_json::Map<String, Value>, String> {
    let content = raw.trim();
    if content.is_empty() || content == "{}" {
        return Ok(serde_json::Map::new());
    }

    let parse_error = match tolerant_parse(content) {
        // A full `{"tool": ..., "arguments": {...}}` envelope may parse
        // even when the original arguments extraction failed; descend
        // into it rather than handing the envelope to the executor.
        Ok(Value::Object(mut map)) => match map.remove("arguments") {
            Some(Value::Object(args)) => return Ok(args),
            Some(_) | None if map.contains_key("tool") => {
                "arguments field is not an object".to_string()
            }
            _ => return Ok(map),
        },
        Ok(_) => "not a JSON object".to_string(),
        Err(e) => e,
    };

    let mut recovered = serde_json::Map::new();
    let mut missing_required = false;
    for param in params {
        if let Some(value) = extract_kv_value(content, &param.name) {
            recovered.insert(param.name.clone(), Value::String(value));
        } else if param.required {
            missing_required = true;
        }
    }

    if !recovered.is_empty() && !missing_required {
        return Ok(recovered);
    }

    if params.len() == 1 {
        let mut single = serde_json::Map::new();
        single.insert(params[0].name.clone(), Value::String(content.to_string()));
        return Ok(single);
    }

    Err(parse_error)
}

/// Find `"key":`, `'key':`, or a bare `key:` in free text and pull out
/// the value that follows.
fn extract_kv_value(content: &str, key: &str) -> Option<String> {
    let bytes = content.as_bytes();
    let mut candidates: Vec<usize> = Vec::new();

    for pattern in [format!("\"{key}\""), format!("'{key}'")] {
        let mut from = 0;
        while let Some(at) = content[from..].find(&pattern) {
            candidates.push(from + at + pattern.len());
            from += at + 1;
        }
    }

    // Bare identifier with word boundaries
    let mut from = 0;
    while let Some(at) = content[from..].find(key) {
        let start = from + at;
        let end = start + key.len();
        let left_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let right_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
        if left_ok && right_ok {
            candidates.push(end);
        }
        from = start + 1;
    }

    for cursor in candidates {
        let mut i = cursor;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b':' {
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            continue;
        }

        let quote = bytes[i];
        if quote == b'"' || quote == b'\'' {
            let value_start = i + 1;
            let mut j = value_start;
            let mut escaped = false;
            while j < bytes.len() {
                let c = bytes[j];
                if escaped {
                    escaped = false;
                } else if c == b'\\' {
                    escaped = true;
                } else if c == quote {
                    break;
                }
                j += 1;
            }
            if j < bytes.len() {
                return Some(content[value_start..j].to_string());
            }
        } else {
            let mut j = i;
            while j < bytes.len() && !matches!(bytes[j], b',' | b'}' | b'\n' | b'\r') {
                j += 1;
            }
            let value = content[i..j].trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Extract the prose outside all tool-call spans, trimmed.
pub fn extract_response_text(response: &str, calls: &[ParsedToolCall]) -> String {
    if calls.is_empty() {
        return response.to_string();
    }

    let mut result = String::new();
    let mut pos = 0;
    for call in calls {
        if call.span.0 > pos {
            result.push_str(&response[pos..call.span.0]);
        }
        pos = call.span.1;
    }
    if pos < response.len() {
        result.push_str(&response[pos..]);
    }

    result.trim().to_string()
}

fn find_byte(bytes: &[u8], needle: u8, from: usize) -> Option<usize> {
    bytes[from..].iter().position(|&b| b == needle).map(|i| from + i)
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Find the byte index just past the `}` matching the `{` at `start`,
/// honoring JSON string and escape state.
fn match_closing_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 1;
    let mut i = start + 1;
    let mut in_string = false;
    let mut escape_next = false;

    while i < bytes.len() && depth > 0 {
        let c = bytes[i];
        if escape_next {
            escape_next = false;
            i += 1;
            continue;
        }
        if c == b'\\' && in_string {
            escape_next = true;
            i += 1;
            continue;
        }
        if c == b'"' {
            in_string = !in_string;
        } else if !in_string {
            if c == b'{' {
                depth += 1;
            } else if c == b'}' {
                depth -= 1;
            }
        }
        i += 1;
    }

    if depth == 0 { Some(i) } else { None }
}
