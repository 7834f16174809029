//! The agentic loop.
//!
//! One [`Agent::run`] call drives a full multi-turn exchange: call the
//! model, parse inline tool calls out of the reply, execute them,
//! inject the framed results as the next user turn, and repeat until
//! the model answers in prose, a tool requests a stop, or the
//! iteration budget runs out (pause). On any fatal path the borrowed
//! history is restored to its pre-run length so the caller can retry
//! cleanly.

use crate::chunker::ContentChunker;
use crate::context::ContextManager;
use crate::intent::{self, Intent};
use crate::parser;
use crate::prompt::build_tools_prompt;
use crate::recovery::{is_token_limit_error, try_truncate_history};
use opencrank_core::agent::{AgentConfig, AgentResult};
use opencrank_core::message::Message;
use opencrank_core::provider::{CompletionOptions, ModelAdapter};
use opencrank_core::tool::{ParsedToolCall, Tool, ToolOutcome, ToolRegistry};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Bounded retries for context-overflow recovery within one run.
const MAX_TOKEN_LIMIT_RETRIES: u32 = 2;

/// Preview budget inside a chunked-result summary.
const CHUNK_PREVIEW_CHARS: usize = 2_000;

/// How much of an unparseable candidate to echo back in diagnostics.
const RAW_DIAGNOSTIC_CHARS: usize = 500;

/// The agent: a tool registry, a content chunker, a configuration, and
/// the loop that ties them to a model adapter.
///
/// The agent exclusively owns its registry, chunker, and config. The
/// chunker is shared with the `content_chunk`/`content_search` tools
/// through an `Arc<Mutex<_>>` handle; the loop itself is single-
/// threaded and cooperative.
pub struct Agent {
    tools: ToolRegistry,
    config: AgentConfig,
    chunker: Arc<Mutex<ContentChunker>>,
    context: Option<ContextManager>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            tools: ToolRegistry::new(),
            chunker: Arc::new(Mutex::new(ContentChunker::new())),
            context: None,
            config,
        }
    }

    /// Attach a context manager consulted before each model call.
    pub fn with_context_manager(mut self, context: ContextManager) -> Self {
        self.context = Some(context);
        self
    }

    /// Register a tool. Replaces any prior tool with the same name.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        debug!(tool = tool.name(), "Registering tool");
        self.tools.register(tool);
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Handle to the content chunker, for wiring up the chunk tools.
    pub fn chunker(&self) -> Arc<Mutex<ContentChunker>> {
        Arc::clone(&self.chunker)
    }

    /// Run the agentic loop for one user message.
    ///
    /// `history` is mutated in place: the user turn, every assistant
    /// reply, and every tool-result turn are appended in program
    /// order. On failure the history is rolled back to its pre-run
    /// length.
    pub async fn run(
        &self,
        model: &dyn ModelAdapter,
        user_message: &str,
        history: &mut Vec<Message>,
        system_prompt: &str,
    ) -> AgentResult {
        self.run_with_session(model, user_message, history, system_prompt, "")
            .await
    }

    /// [`Agent::run`] with a session key used when the context manager
    /// persists a resume.
    pub async fn run_with_session(
        &self,
        model: &dyn ModelAdapter,
        user_message: &str,
        history: &mut Vec<Message>,
        system_prompt: &str,
        session_key: &str,
    ) -> AgentResult {
        let mut result = AgentResult::default();

        if !model.is_configured() {
            result.error = Some("Model not configured".into());
            return result;
        }

        info!(
            message = %truncate_for_log(user_message, 50),
            "Starting agentic loop"
        );

        // Recorded so fatal paths can roll the history back
        let initial_history_len = history.len();
        history.push(Message::user(user_message));

        let tools_prompt = build_tools_prompt(&self.tools);
        let full_system_prompt = if tools_prompt.is_empty() {
            system_prompt.to_string()
        } else {
            format!("{tools_prompt}\n\n{system_prompt}")
        };

        let mut consecutive_errors = 0u32;
        let mut token_limit_retries = 0u32;
        let mut accumulated_response = String::new();

        // dedup key → iteration the call last executed in
        let mut recent_tool_calls: HashMap<String, u32> = HashMap::new();

        while result.iterations < self.config.max_iterations {
            result.iterations += 1;
            debug!(iteration = result.iterations, "Loop iteration");

            // Consult the context manager; resume generation itself
            // runs with skip_context_management so it cannot recurse.
            if let Some(context) = &self.context
                && context.needs_resume(history, &full_system_prompt)
            {
                context
                    .perform_resume_cycle(model, history, system_prompt, session_key)
                    .await;
            }

            let options = CompletionOptions {
                system_prompt: full_system_prompt.clone(),
                max_tokens: 4096,
                ..CompletionOptions::default()
            };

            let completion = match model.chat(history, &options).await {
                Ok(c) => c,
                Err(e) => {
                    let message = e.to_string();
                    warn!(error = %message, "Model call failed");

                    if is_token_limit_error(&message) {
                        token_limit_retries += 1;
                        warn!(
                            attempt = token_limit_retries,
                            max = MAX_TOKEN_LIMIT_RETRIES,
                            "Token limit exceeded, trying to recover"
                        );

                        if token_limit_retries <= MAX_TOKEN_LIMIT_RETRIES
                            && try_truncate_history(history)
                        {
                            // Recovery does not consume the error budget
                            consecutive_errors = 0;
                            continue;
                        }

                        result.error = Some(
                            "Context window exceeded and recovery failed. \
                             Try a simpler request or use smaller data."
                                .into(),
                        );
                        history.truncate(initial_history_len.min(history.len()));
                        return result;
                    }

                    consecutive_errors += 1;
                    if consecutive_errors >= self.config.max_consecutive_errors {
                        result.error = Some(format!("Too many consecutive AI errors: {message}"));
                        history.truncate(initial_history_len.min(history.len()));
                        return result;
                    }
                    continue;
                }
            };

            consecutive_errors = 0;
            token_limit_retries = 0;
            let response = completion.content;
            debug!(len = response.len(), "Model reply");

            let calls = parser::parse_tool_calls(&response);

            if calls.is_empty() {
                match intent::classify(&response) {
                    Intent::Act if result.iterations < self.config.max_iterations => {
                        info!("Reply indicates tool intent without a call; goading");
                        history.push(Message::assistant(&response));
                        history.push(Message::user(intent::GOAD_PROMPT));
                        continue;
                    }
                    Intent::Question => {
                        debug!("Reply is a question for the user; ending normally");
                        history.push(Message::assistant(&response));
                        result.success = true;
                        result.final_response = response;
                        return result;
                    }
                    _ => {
                        info!(iterations = result.iterations, "No tool calls; loop complete");
                        history.push(Message::assistant(&response));
                        result.success = true;
                        result.final_response = response;
                        return result;
                    }
                }
            }

            info!(count = calls.len(), "Executing tool calls");
            let mut results_text = String::new();
            let mut should_continue_loop = true;
            let mut seen_in_response: HashSet<String> = HashSet::new();

            for call in &calls {
                let key = call.dedup_key();

                // Exact duplicate within the same reply: execute once
                if !seen_in_response.insert(key.clone()) {
                    warn!(tool = %call.tool_name, "Duplicate call in same reply skipped");
                    let _ = writeln!(
                        results_text,
                        "[TOOL_RESULT tool={} success=true]\n\
                         (Duplicate call skipped - same tool with same parameters \
                         was already called in this response)\n[/TOOL_RESULT]",
                        call.tool_name
                    );
                    continue;
                }

                // Same call as the immediately previous iteration:
                // replace with guidance. A gap of two or more
                // iterations is logged but still executed.
                if let Some(&prev_iteration) = recent_tool_calls.get(&key) {
                    warn!(
                        tool = %call.tool_name,
                        previous = prev_iteration,
                        current = result.iterations,
                        "Repeated tool call across iterations"
                    );
                    if prev_iteration == result.iterations - 1 {
                        let _ = writeln!(
                            results_text,
                            "[TOOL_RESULT tool={} success=true]\n\
                             (This exact tool call was already made in the previous iteration. \
                             The result has not changed. Please use the previous result \
                             or try a different approach.)\n[/TOOL_RESULT]",
                            call.tool_name
                        );
                        continue;
                    }
                }
                recent_tool_calls.insert(key, result.iterations);

                result.tool_calls_made += 1;
                if !result.tools_used.contains(&call.tool_name) {
                    result.tools_used.push(call.tool_name.clone());
                }

                let outcome = self.execute_tool(call).await;
                if !outcome.should_continue {
                    should_continue_loop = false;
                }
                results_text.push_str(&self.format_tool_result(&call.tool_name, &outcome));
                results_text.push('\n');
            }

            let text_response = parser::extract_response_text(&response, &calls);

            // The raw reply (tool-call JSON included) goes to history,
            // followed by one user turn with all formatted results.
            history.push(Message::assistant(&response));
            history.push(Message::user(&results_text));

            if !should_continue_loop {
                info!("Tool requested stop, ending loop");
                result.success = true;
                result.final_response = if text_response.is_empty() {
                    "Task completed.".into()
                } else {
                    text_response
                };
                return result;
            }

            if !text_response.is_empty() {
                if !accumulated_response.is_empty() {
                    accumulated_response.push_str("\n\n");
                }
                accumulated_response.push_str(&text_response);
            }
        }

        // Iteration budget exhausted: pause rather than fail, leaving
        // the history intact for a later continuation run.
        warn!(
            max = self.config.max_iterations,
            "Reached max iterations, pausing for user confirmation"
        );
        result.success = false;
        result.paused = true;

        let mut pause = format!(
            "⏸️ **Task paused after {} iterations**\n\n",
            self.config.max_iterations
        );
        if !accumulated_response.is_empty() {
            let _ = write!(pause, "Progress so far:\n{accumulated_response}\n\n");
        }
        let _ = write!(
            pause,
            "The AI has made {} tool calls and needs more iterations to complete the task.\n\n\
             **Options:**\n\
             • `/continue` - Allow 15 more iterations\n\
             • `/continue <N>` - Allow N more iterations\n\
             • `/continue no-stop` - Remove iteration limit (use with caution)\n\
             • `/cancel` - Stop the task\n",
            result.tool_calls_made
        );

        result.pause_message = Some(pause.clone());
        result.final_response = pause;
        result
    }

    /// Execute one parsed call against the registry, with the
    /// execution-side diagnostics and argument recovery of the
    /// invocation contract.
    async fn execute_tool(&self, call: &ParsedToolCall) -> ToolOutcome {
        // A frequent model mistake: using the literal token "tool_call"
        if call.tool_name == "tool_call" {
            let mut hint = String::from(
                "ERROR: Used 'tool_call' as name. Must use actual tool name.\nAvailable tools: ",
            );
            hint.push_str(&self.tools.names().join(", "));
            hint.push_str("\nExample: {\"tool\": \"shell\", \"arguments\": {\"command\": \"ls\"}}");
            return ToolOutcome::fail(hint);
        }

        let Some(tool) = self.tools.get(&call.tool_name) else {
            return ToolOutcome::fail(format!(
                "Unknown tool: {}\nAvailable tools: {}",
                call.tool_name,
                self.tools.names().join(", ")
            ));
        };

        let args = if call.valid {
            call.args.clone()
        } else {
            match parser::recover_args(&tool.params(), &call.raw) {
                Ok(recovered) => {
                    debug!(tool = %call.tool_name, "Recovered tool params from raw content");
                    serde_json::Value::Object(recovered)
                }
                Err(recover_error) => {
                    let error = call
                        .parse_error
                        .clone()
                        .unwrap_or(recover_error);
                    return ToolOutcome::fail(invalid_call_diagnostic(&error, &call.raw));
                }
            }
        };

        info!(tool = %call.tool_name, "Executing tool");
        debug!(args = %args, "Tool params");

        let outcome = tool.execute(&args).await;
        debug!(
            tool = %call.tool_name,
            success = outcome.success,
            output_len = outcome.output.len(),
            "Tool finished"
        );
        outcome
    }

    /// Frame an outcome for injection into the conversation. Oversized
    /// successful outputs are stored in the chunker and replaced by a
    /// summary with a preview and retrieval instructions.
    fn format_tool_result(&self, tool_name: &str, outcome: &ToolOutcome) -> String {
        let mut out = format!(
            "[TOOL_RESULT tool={tool_name} success={}]\n",
            outcome.success
        );

        if !outcome.success {
            let _ = write!(out, "Error: {}", outcome.error);
            out.push_str("\n[/TOOL_RESULT]");
            return out;
        }

        let too_large = self.config.auto_chunk_large_results
            && outcome.output.len() > self.config.max_tool_result_size;
        if !too_large {
            out.push_str(&outcome.output);
            out.push_str("\n[/TOOL_RESULT]");
            return out;
        }

        // Chunks must individually fit under the size that triggered
        // chunking, and so must the preview.
        let chunk_size = self
            .config
            .effective_chunk_size()
            .min(self.config.max_tool_result_size);
        let (chunk_id, total_chunks) = {
            let mut chunker = self.chunker.lock().expect("chunker poisoned");
            let id = chunker.store(outcome.output.clone(), tool_name, chunk_size);
            let total = chunker.total_chunks(&id);
            (id, total)
        };

        info!(
            bytes = outcome.output.len(),
            id = %chunk_id,
            chunks = total_chunks,
            "Large tool result chunked"
        );

        let mut preview_len = CHUNK_PREVIEW_CHARS
            .min(self.config.max_tool_result_size)
            .min(outcome.output.len());
        while !outcome.output.is_char_boundary(preview_len) {
            preview_len -= 1;
        }

        let _ = write!(
            out,
            "Content too large ({} characters). Stored as '{chunk_id}' with {total_chunks} chunks.\n\n\
             === Preview (first {preview_len} characters) ===\n{}",
            outcome.output.len(),
            &outcome.output[..preview_len]
        );
        if preview_len < outcome.output.len() {
            out.push_str("\n... [content truncated] ...\n");
        }
        let _ = write!(
            out,
            "\n\n=== To access full content ===\n\
             Use 'content_chunk' tool with id=\"{chunk_id}\" and chunk=0 to get first chunk.\n\
             Use 'content_search' tool with id=\"{chunk_id}\" and query=\"your search\" to find specific content.\n\
             Total chunks available: {total_chunks}"
        );
        out.push_str("\n[/TOOL_RESULT]");
        out
    }
}

fn invalid_call_diagnostic(error: &str, raw: &str) -> String {
    let mut cut = RAW_DIAGNOSTIC_CHARS.min(raw.len());
    while !raw.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = format!(
        "Invalid tool call - JSON parsing failed.\n\n\
         Error: {error}\n\n\
         **Common issues:**\n\
         1. Unescaped quotes in strings - Use \\\" inside JSON strings\n\
         2. For curl commands, prefer single quotes on the outside:\n   \
            {{\"command\": \"curl -H 'Header: value' 'https://url'\"}}\n\
         3. Or properly escape all internal quotes:\n   \
            {{\"command\": \"curl -H \\\"Header: value\\\" \\\"https://url\\\"\"}}\n\
         4. For complex JSON payloads, write to a file first:\n   \
            Use the 'write' tool to create a JSON file, then pass the file path\n\n\
         Raw content received:\n{}",
        &raw[..cut]
    );
    if raw.len() > RAW_DIAGNOSTIC_CHARS {
        out.push_str("... [truncated]");
    }
    out
}

fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &s[..cut])
}
