//! Context-window management with a resume-based strategy.
//!
//! Instead of blindly chopping messages, the manager watches estimated
//! usage and, when the conversation nears capacity, runs a resume
//! cycle: the model summarizes the conversation, the summary is saved
//! to persistent memory, the history is wiped, and the summary is
//! injected as fresh context for seamless continuation.

use chrono::Local;
use opencrank_core::message::{Message, Role};
use opencrank_core::provider::{CompletionOptions, ModelAdapter};
use opencrank_memory::{MemoryEntry, MemoryStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Per-message overhead added to the character estimate (role tags,
/// formatting).
const MESSAGE_OVERHEAD_CHARS: usize = 20;

/// Prompt sent to the model to produce the structured resume.
const RESUME_PROMPT: &str = "You are about to run out of context window space. Your task now is to create \
a RESUME of everything that has happened in this conversation. This resume will \
capture the essence of the conversation that will be used to restore your memory \
after the context is cleared.\n\n\
The resume MUST include:\n\
1. **Your original instructions and role** - What system prompt/personality you were given\n\
2. **What the user asked for** - The original request and any follow-up requests\n\
3. **What you did** - Brief overview of tools called, actions taken, results obtained\n\
4. **Current state** - Where you are in the task, what's pending\n\
5. **Important facts** - Any key information, file paths, URLs, names mentioned\n\
6. **What to do next** - Clear instructions for continuing the task\n\n\
What to avoid in the resume:\n\
- Do NOT include irrelevant chit-chat or pleasantries\n\
- Do NOT include content that can be easily re-read from the conversation\n\
- Do NOT include parameters used on the tools\n\n\
Write the resume as a structured document. Be comprehensive but concise. \
Do NOT use any tools. Just output the resume text directly.";

/// Configuration for the context manager.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Trigger a resume at this fraction of the budget
    pub usage_threshold: f64,
    /// Total context budget in characters
    pub max_context_chars: usize,
    /// Characters reserved for the model's response
    pub reserve_for_response: usize,
    /// Maximum resume size before truncation
    pub max_resume_chars: usize,
    /// Persist resumes into the memory store
    pub auto_save_memory: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            usage_threshold: 0.75,
            max_context_chars: 16_000,
            reserve_for_response: 4_000,
            max_resume_chars: 3_000,
            auto_save_memory: true,
        }
    }
}

/// A snapshot of estimated context usage.
#[derive(Debug, Clone, Default)]
pub struct ContextUsage {
    pub system_prompt_chars: usize,
    pub history_chars: usize,
    pub total_chars: usize,
    pub budget_chars: usize,
    pub usage_ratio: f64,
    pub needs_resume: bool,
}

/// The resume-cycle orchestrator.
///
/// Holds a non-owning reference to the memory store for persistence;
/// the model adapter is passed per call so the manager works across
/// providers.
pub struct ContextManager {
    config: ContextConfig,
    memory: Option<Arc<MemoryStore>>,
    /// Directory for daily resume files (`<dir>/YYYY-MM-DD.md`)
    daily_notes_dir: Option<PathBuf>,
}

impl ContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            memory: None,
            daily_notes_dir: None,
        }
    }

    /// Attach the memory store used for resume persistence.
    pub fn with_memory(mut self, memory: Arc<MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Attach the on-disk directory for daily resume files.
    pub fn with_daily_notes_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.daily_notes_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    fn estimate_history_chars(history: &[Message]) -> usize {
        history
            .iter()
            .map(|m| m.content.len() + MESSAGE_OVERHEAD_CHARS)
            .sum()
    }

    /// Character-based usage estimate for the given conversation.
    pub fn estimate_usage(&self, history: &[Message], system_prompt: &str) -> ContextUsage {
        let system_prompt_chars = system_prompt.len();
        let history_chars = Self::estimate_history_chars(history);
        let total_chars = system_prompt_chars + history_chars;
        let budget_chars = self
            .config
            .max_context_chars
            .saturating_sub(self.config.reserve_for_response);

        let usage_ratio = if budget_chars > 0 {
            total_chars as f64 / budget_chars as f64
        } else {
            1.0
        };

        ContextUsage {
            system_prompt_chars,
            history_chars,
            total_chars,
            budget_chars,
            usage_ratio,
            needs_resume: usage_ratio >= self.config.usage_threshold,
        }
    }

    /// Whether the conversation has crossed the resume threshold.
    pub fn needs_resume(&self, history: &[Message], system_prompt: &str) -> bool {
        self.estimate_usage(history, system_prompt).needs_resume
    }

    /// Ask the model for a structured resume of the conversation.
    /// Returns an empty string on failure.
    pub async fn generate_resume(
        &self,
        adapter: &dyn ModelAdapter,
        history: &[Message],
        system_prompt: &str,
    ) -> String {
        if !adapter.is_configured() {
            error!("Cannot generate resume: model not configured");
            return String::new();
        }

        let mut resume_messages = history.to_vec();
        resume_messages.push(Message::user(RESUME_PROMPT));

        let options = CompletionOptions {
            system_prompt: system_prompt.to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            // Resume generation must not trigger another resume cycle
            skip_context_management: true,
            ..CompletionOptions::default()
        };

        info!(messages = history.len(), "Generating conversation resume");
        let completion = match adapter.chat(&resume_messages, &options).await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to generate resume: {e}");
                return String::new();
            }
        };

        let mut resume = completion.content;
        if resume.len() > self.config.max_resume_chars {
            let mut cut = self.config.max_resume_chars;
            while !resume.is_char_boundary(cut) {
                cut -= 1;
            }
            resume.truncate(cut);
            resume.push_str("\n\n[Resume truncated due to size limits]");
            warn!(chars = resume.len(), "Resume truncated");
        }

        info!(chars = resume.len(), "Generated resume");
        resume
    }

    /// Persist a resume: append to the daily file and save a memory
    /// entry (category "resume", importance 8). Returns whether either
    /// destination succeeded.
    pub async fn save_resume_to_memory(&self, resume: &str, session_key: &str) -> bool {
        let now = Local::now();
        let mut content = format!(
            "# Context Resume\n\n**Generated:** {}\n",
            now.format("%Y-%m-%d %H:%M:%S")
        );
        if !session_key.is_empty() {
            content.push_str(&format!("**Session:** {session_key}\n"));
        }
        content.push_str("\n---\n\n");
        content.push_str(resume);

        let mut file_ok = false;
        if let Some(dir) = &self.daily_notes_dir {
            let path = dir.join(format!("{}.md", now.format("%Y-%m-%d")));
            match append_to_file(&path, &content) {
                Ok(()) => {
                    info!(path = %path.display(), "Resume saved to daily file");
                    file_ok = true;
                }
                Err(e) => error!("Failed to save resume file: {e}"),
            }
        }

        let mut db_ok = false;
        if let Some(memory) = &self.memory {
            let mut entry = MemoryEntry::new(content);
            entry.category = "resume".into();
            entry.importance = 8;
            entry.tags = "context,resume,session".into();
            match memory.save_memory(&entry).await {
                Ok(_) => {
                    info!("Resume saved to database");
                    db_ok = true;
                }
                Err(e) => error!("Failed to save resume to database: {e}"),
            }
        } else {
            warn!("Memory store not attached; resume not persisted to database");
        }

        file_ok || db_ok
    }

    /// Look up the most recent resume for a session. Empty on miss.
    pub async fn load_resume_from_memory(&self, session_key: &str) -> String {
        let Some(memory) = &self.memory else {
            return String::new();
        };

        let query = format!("context resume {session_key}");
        match memory.search_memories(&query, 1, None).await {
            Ok(hits) => hits
                .into_iter()
                .next()
                .map(|hit| hit.entry.content)
                .unwrap_or_default(),
            Err(e) => {
                error!("Resume lookup failed: {e}");
                String::new()
            }
        }
    }

    /// Build a fresh history with the resume injected.
    pub fn build_resumed_history(
        &self,
        resume: &str,
        last_user_message: &str,
        system_prompt: &str,
    ) -> Vec<Message> {
        let mut fresh = Vec::new();

        if !system_prompt.is_empty() {
            fresh.push(Message::system(system_prompt));
        }

        // Injected as a user message since some providers reject
        // multiple system messages.
        fresh.push(Message::user(format!(
            "[CONTEXT RESUME - Previous conversation was cleared to free up context space. \
             Below is a summary of everything that happened before this point.]\n\n{resume}\n\n\
             [END CONTEXT RESUME - Continue from where you left off. \
             You have a fresh context window now.]"
        )));

        fresh.push(Message::assistant(
            "Understood. I've reviewed the context resume and I'm ready to continue where we left off.",
        ));

        if !last_user_message.is_empty() {
            fresh.push(Message::user(last_user_message));
        }

        fresh
    }

    /// Perform the full resume cycle in place. Returns true when the
    /// history was replaced; on failure the history is untouched.
    pub async fn perform_resume_cycle(
        &self,
        adapter: &dyn ModelAdapter,
        history: &mut Vec<Message>,
        system_prompt: &str,
        session_key: &str,
    ) -> bool {
        let usage = self.estimate_usage(history, system_prompt);
        info!(
            ratio = format!("{:.1}%", usage.usage_ratio * 100.0),
            total = usage.total_chars,
            budget = usage.budget_chars,
            messages = history.len(),
            "Starting context resume cycle"
        );

        let resume = self.generate_resume(adapter, history, system_prompt).await;
        if resume.is_empty() {
            error!("Failed to generate resume, aborting cycle");
            return false;
        }

        if self.config.auto_save_memory {
            self.save_resume_to_memory(&resume, session_key).await;
        } else {
            debug!("Skipping resume persistence (auto_save_memory=false)");
        }

        // The most recent real user message (not an injected tool result)
        let last_user_message = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User && !m.content.contains("[TOOL_RESULT"))
            .map(|m| m.content.clone())
            .unwrap_or_default();

        info!(wiped = history.len(), "Wiping context and injecting resume");
        *history = self.build_resumed_history(&resume, &last_user_message, system_prompt);

        let new_usage = self.estimate_usage(history, system_prompt);
        info!(
            ratio = format!("{:.1}%", new_usage.usage_ratio * 100.0),
            messages = history.len(),
            "Context resumed"
        );
        true
    }
}

fn append_to_file(path: &std::path::Path, content: &str) -> std::io::Result<()> {
    use std::io::Write as _;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{content}")
}
