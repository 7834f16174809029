//! # OpenCrank Core
//!
//! Domain types, traits, and error definitions for the OpenCrank agent
//! runtime. This crate defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem boundary is defined as a trait or plain data here.
//! Implementations live in their respective crates:
//! - `opencrank-agent` — the agentic loop, parser, chunker, context manager
//! - `opencrank-memory` — the SQLite memory store
//! - `opencrank-tools` — built-in tool implementations
//! - `opencrank-security` — the Landlock sandbox
//!
//! This keeps the dependency graph pointing inward and makes every piece
//! testable against mock implementations.

pub mod agent;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentConfig, AgentResult};
pub use error::{Error, MemoryError, ModelError, Result, SandboxError, ToolError};
pub use message::{Message, Role, Session};
pub use provider::{Completion, CompletionOptions, ModelAdapter, RawToolCall, Usage};
pub use tool::{ParamKind, ParsedToolCall, Tool, ToolOutcome, ToolParam, ToolRegistry};
