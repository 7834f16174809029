//! Persistent memory for the OpenCrank agent runtime.
//!
//! A single SQLite database holds three logical concerns behind one
//! facade: structured memories with BM25 full-text search, tasks with
//! due dates, and a small key/value meta table.

pub mod store;

pub use store::{MemoryEntry, MemorySearchHit, MemoryStore, MemoryTask};
