//! The OpenCrank agentic loop.
//!
//! This crate drives the "think → emit tool calls → execute → feed
//! results back" cycle:
//! - [`loop_runner`] — the [`Agent`](loop_runner::Agent) itself
//! - [`parser`] — tolerant extraction of inline JSON tool calls
//! - [`intent`] — question detection and the intent-to-act goad
//! - [`chunker`] — in-memory store for oversized tool outputs
//! - [`context`] — resume-based context-window management
//! - [`recovery`] — token-limit error classification and history repair
//! - [`prompt`] — the tools preamble rendered into the system prompt

pub mod chunker;
pub mod context;
pub mod html;
pub mod intent;
pub mod loop_runner;
pub mod parser;
pub mod prompt;
pub mod recovery;

pub use chunker::ContentChunker;
pub use context::{ContextConfig, ContextManager, ContextUsage};
pub use loop_runner::Agent;
