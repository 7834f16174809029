//! Task and reminder tools (`task_*`).

use crate::args;
use async_trait::async_trait;
use chrono::{Local, TimeZone};
use opencrank_core::tool::{ParamKind, Tool, ToolOutcome, ToolParam};
use opencrank_memory::{MemoryStore, MemoryTask};
use std::fmt::Write as _;
use std::sync::Arc;

pub struct TaskCreateTool {
    store: Arc<MemoryStore>,
}

impl TaskCreateTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for TaskCreateTool {
    fn name(&self) -> &str {
        "task_create"
    }

    fn description(&self) -> &str {
        "Create a task or reminder."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::string("content", "The task description", true),
            ToolParam::string("context", "Additional context or notes", false),
            ToolParam::new(
                "due_at",
                ParamKind::Number,
                "Due date as Unix timestamp in ms (0 = no due date)",
                false,
            ),
        ]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let content = match args::required_str(arguments, "content") {
            Ok(c) => c,
            Err(e) => return ToolOutcome::fail(e),
        };

        let mut task = MemoryTask::new(content);
        if let Some(context) = args::optional_str(arguments, "context") {
            task.context = context.to_string();
        }
        if let Some(due_at) = args::optional_i64(arguments, "due_at") {
            task.due_at = due_at.max(0);
        }

        match self.store.create_task(&task).await {
            Ok(id) => ToolOutcome::ok(format!("Task created (id: {id})")),
            Err(e) => ToolOutcome::fail(format!("Failed to create task: {e}")),
        }
    }
}

pub struct TaskCompleteTool {
    store: Arc<MemoryStore>,
}

impl TaskCompleteTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for TaskCompleteTool {
    fn name(&self) -> &str {
        "task_complete"
    }

    fn description(&self) -> &str {
        "Mark a task as completed."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::string("task_id", "The task ID to complete", true)]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let task_id = match args::required_str(arguments, "task_id") {
            Ok(id) => id,
            Err(e) => return ToolOutcome::fail(e),
        };

        match self.store.complete_task(task_id).await {
            Ok(true) => ToolOutcome::ok(format!("Task {task_id} completed.")),
            Ok(false) => ToolOutcome::fail(format!("No task with id {task_id}.")),
            Err(e) => ToolOutcome::fail(format!("Failed to complete task: {e}")),
        }
    }
}

pub struct TaskListTool {
    store: Arc<MemoryStore>,
}

impl TaskListTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for TaskListTool {
    fn name(&self) -> &str {
        "task_list"
    }

    fn description(&self) -> &str {
        "List tasks, soonest due first."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::new(
            "include_completed",
            ParamKind::Boolean,
            "Whether to include completed tasks (default: false)",
            false,
        )]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let include_completed = args::flag(arguments, "include_completed");

        let tasks = match self.store.list_tasks(include_completed, None).await {
            Ok(tasks) => tasks,
            Err(e) => return ToolOutcome::fail(format!("Failed to list tasks: {e}")),
        };

        if tasks.is_empty() {
            return ToolOutcome::ok("No tasks.".to_string());
        }

        let mut out = format!("{} task(s):\n\n", tasks.len());
        for task in &tasks {
            let status = if task.completed { "[done]" } else { "[open]" };
            let _ = write!(out, "- {status} {}", task.content);
            if task.due_at > 0
                && let Some(due) = Local.timestamp_millis_opt(task.due_at).single()
            {
                let _ = write!(out, " (due {})", due.format("%Y-%m-%d %H:%M"));
            }
            let _ = writeln!(out, "\n  id: {}", task.id);
        }
        ToolOutcome::ok(out)
    }
}
