//! Lenient extraction from tool argument objects.
//!
//! Models routinely send numbers and booleans as strings ("chunk":
//! "3", "clean_html": "true"); every accessor here coerces those
//! shapes rather than failing the call.

use serde_json::Value;

/// A required string argument, or a uniform error message.
pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Missing required parameter: {key}"))
}

/// An optional string argument.
pub fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// A non-negative integer, accepting both numbers and numeric strings.
pub fn optional_usize(args: &Value, key: &str) -> Option<usize> {
    match args.get(key) {
        Some(Value::Number(n)) => n.as_u64().map(|v| v as usize),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A signed integer, accepting both numbers and numeric strings.
pub fn optional_i64(args: &Value, key: &str) -> Option<i64> {
    match args.get(key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A boolean, accepting `true`/`false`, "true"/"1"/"yes", and their
/// negatives. Defaults to `false` when absent or unrecognized.
pub fn flag(args: &Value, key: &str) -> bool {
    match args.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}
