//! Message and Session domain types.
//!
//! These are the core value objects that flow through the system: the
//! host hands the agent a session history, the agent appends turns as
//! the conversation progresses, and tool results are injected back as
//! user turns.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The role of a message sender in a conversation.
///
/// Tool results are injected as `User` turns carrying a
/// `[TOOL_RESULT ...]` framed body, so only three roles exist on the
/// wire. Providers that require strict role alternation must never see
/// two consecutive messages with the same role; the agent enforces
/// this after history truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (identity, rules, tools preamble)
    System,
    /// The end user (or an injected tool-result turn)
    User,
    /// The AI assistant
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A session owns a conversation history and a per-session key/value
/// scratch map.
///
/// Sessions are exclusively owned by their host channel; the agent
/// borrows the history mutably for the duration of a run and restores
/// it to its pre-run length on any fatal failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session key
    pub id: String,

    /// Ordered conversation history
    pub messages: Vec<Message>,

    /// Per-session scratch values (continuation budgets, channel hints, ...)
    #[serde(default)]
    pub scratch: HashMap<String, String>,
}

impl Session {
    /// Create a new empty session with a generated id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Create a new empty session with an explicit id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            scratch: HashMap::new(),
        }
    }

    /// Add a message to the session history.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Set a scratch value, returning the previous one if present.
    pub fn set_scratch(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.scratch.insert(key.into(), value.into())
    }

    /// Get a scratch value.
    pub fn scratch(&self, key: &str) -> Option<&str> {
        self.scratch.get(key).map(|s| s.as_str())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::system("Be helpful.");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn session_scratch_roundtrip() {
        let mut session = Session::with_id("cli:main");
        assert!(session.scratch("budget").is_none());
        session.set_scratch("budget", "15");
        assert_eq!(session.scratch("budget"), Some("15"));
        let prev = session.set_scratch("budget", "30");
        assert_eq!(prev.as_deref(), Some("15"));
    }

    #[test]
    fn session_history_appends_in_order() {
        let mut session = Session::new();
        session.push(Message::user("first"));
        session.push(Message::assistant("second"));
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, Role::User);
        assert_eq!(session.messages[1].role, Role::Assistant);
    }
}
