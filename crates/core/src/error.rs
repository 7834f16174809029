//! Error types for the OpenCrank domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for all OpenCrank operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model adapter errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Sandbox errors ---
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors from a model adapter (`chat` call).
///
/// The agent loop classifies context-overflow conditions by substring
/// matching on the `Display` text of these errors, so adapters should
/// surface the provider's error message verbatim where possible.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Model not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Completion(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Store is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Failed to create directory '{path}': {reason}")]
    DirectoryCreation { path: String, reason: String },

    #[error("Sandbox not initialized")]
    NotInitialized,

    #[error("Ruleset error: {0}")]
    Ruleset(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_displays_correctly() {
        let err = Error::Model(ModelError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn completion_error_is_verbatim() {
        // The token-limit classifier matches on the raw provider message,
        // so the Completion variant must not add any framing.
        let err = ModelError::Completion("prompt exceeds context length".into());
        assert_eq!(err.to_string(), "prompt exceeds context length");
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::PermissionDenied {
            tool_name: "shell".into(),
            reason: "workdir outside jail".into(),
        });
        assert!(err.to_string().contains("shell"));
        assert!(err.to_string().contains("jail"));
    }
}
