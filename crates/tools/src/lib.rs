//! Built-in tools for the OpenCrank agent.
//!
//! One module per tool family, mirroring what the agent advertises:
//! - [`shell`] — command execution with timeout and sandbox scoping
//! - [`file_read`], [`file_write`], [`list_dir`] — workspace files
//! - [`chunk`] — paging and searching chunked content
//! - [`memory`] — structured memory entries in the database
//! - [`tasks`] — tasks and reminders in the database
//! - [`notes`] — memory notes on disk (MEMORY.md, daily files)

pub mod args;
pub mod chunk;
pub mod file_read;
pub mod file_write;
pub mod list_dir;
pub mod memory;
pub mod notes;
pub mod shell;
pub mod tasks;

pub use chunk::{ContentChunkTool, ContentSearchTool};
pub use file_read::ReadTool;
pub use file_write::WriteTool;
pub use list_dir::ListDirTool;
pub use memory::{MemoryDeleteTool, MemoryListTool, MemorySaveTool, MemorySearchTool};
pub use notes::{FileGetTool, FileListTool, FileSaveTool};
pub use shell::ShellTool;
pub use tasks::{TaskCompleteTool, TaskCreateTool, TaskListTool};

use opencrank_agent::Agent;
use opencrank_memory::MemoryStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Register the full built-in tool set on an agent.
///
/// `workspace` is the directory file and shell tools operate in
/// (normally the sandbox jail); memory notes live beneath it.
pub fn install_builtin_tools(
    agent: &mut Agent,
    store: Arc<MemoryStore>,
    workspace: impl Into<PathBuf>,
    shell_timeout_secs: u64,
) {
    let workspace = workspace.into();
    let chunker = agent.chunker();

    agent.register_tool(Arc::new(ShellTool::new(&workspace, shell_timeout_secs)));
    agent.register_tool(Arc::new(ReadTool::new(&workspace)));
    agent.register_tool(Arc::new(WriteTool::new(&workspace)));
    agent.register_tool(Arc::new(ListDirTool::new(&workspace)));

    agent.register_tool(Arc::new(ContentChunkTool::new(Arc::clone(&chunker))));
    agent.register_tool(Arc::new(ContentSearchTool::new(chunker)));

    agent.register_tool(Arc::new(MemorySaveTool::new(Arc::clone(&store))));
    agent.register_tool(Arc::new(MemorySearchTool::new(Arc::clone(&store))));
    agent.register_tool(Arc::new(MemoryListTool::new(Arc::clone(&store))));
    agent.register_tool(Arc::new(MemoryDeleteTool::new(Arc::clone(&store))));

    agent.register_tool(Arc::new(TaskCreateTool::new(Arc::clone(&store))));
    agent.register_tool(Arc::new(TaskCompleteTool::new(Arc::clone(&store))));
    agent.register_tool(Arc::new(TaskListTool::new(store)));

    agent.register_tool(Arc::new(FileSaveTool::new(&workspace)));
    agent.register_tool(Arc::new(FileGetTool::new(&workspace)));
    agent.register_tool(Arc::new(FileListTool::new(&workspace)));
}
