//! End-to-end tests for the agentic loop against a scripted model.

use async_trait::async_trait;
use opencrank_agent::Agent;
use opencrank_core::agent::AgentConfig;
use opencrank_core::error::ModelError;
use opencrank_core::message::{Message, Role};
use opencrank_core::provider::{Completion, CompletionOptions, ModelAdapter};
use opencrank_core::tool::{Tool, ToolOutcome, ToolParam};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

/// A model that replays a fixed script. Once the script is exhausted
/// the last step repeats, which lets tests model "always emits a tool
/// call" behavior.
struct ScriptedModel {
    script: Mutex<Vec<Result<String, ModelError>>>,
    cursor: AtomicUsize,
    configured: bool,
}

impl ScriptedModel {
    fn new(script: Vec<Result<String, ModelError>>) -> Self {
        Self {
            script: Mutex::new(script),
            cursor: AtomicUsize::new(0),
            configured: true,
        }
    }

    fn replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok((*r).to_string())).collect())
    }
}

#[async_trait]
impl ModelAdapter for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }
    fn is_configured(&self) -> bool {
        self.configured
    }
    async fn chat(
        &self,
        _history: &[Message],
        _options: &CompletionOptions,
    ) -> Result<Completion, ModelError> {
        let script = self.script.lock().unwrap();
        let at = self.cursor.fetch_add(1, Ordering::SeqCst).min(script.len() - 1);
        script[at].clone().map(|content| Completion {
            content,
            stop_reason: Some("stop".into()),
            model: "scripted".into(),
            usage: None,
        })
    }
}

/// Echo tool that counts its executions.
struct CountingEcho {
    executions: Arc<AtomicU32>,
}

#[async_trait]
impl Tool for CountingEcho {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echoes back the input"
    }
    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::string("text", "Text to echo", true)]
    }
    async fn execute(&self, args: &serde_json::Value) -> ToolOutcome {
        self.executions.fetch_add(1, Ordering::SeqCst);
        ToolOutcome::ok(args["text"].as_str().unwrap_or(""))
    }
}

fn echo_agent(config: AgentConfig) -> (Agent, Arc<AtomicU32>) {
    let executions = Arc::new(AtomicU32::new(0));
    let mut agent = Agent::new(config);
    agent.register_tool(Arc::new(CountingEcho {
        executions: Arc::clone(&executions),
    }));
    (agent, executions)
}

const ECHO_CALL: &str = r#"{"tool": "echo", "arguments": {"text": "abc"}}"#;

#[tokio::test]
async fn plain_text_turn() {
    let model = ScriptedModel::replies(&["hello"]);
    let agent = Agent::new(AgentConfig::default());
    let mut history = Vec::new();

    let result = agent.run(&model, "hi", &mut history, "S").await;

    assert!(result.success);
    assert!(!result.paused);
    assert_eq!(result.final_response, "hello");
    assert_eq!(result.tool_calls_made, 0);
    assert_eq!(result.iterations, 1);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], Message::user("hi"));
    assert_eq!(history[1], Message::assistant("hello"));
}

#[tokio::test]
async fn single_tool_call_roundtrip() {
    let model = ScriptedModel::replies(&[ECHO_CALL, "done"]);
    let (agent, executions) = echo_agent(AgentConfig::default());
    let mut history = Vec::new();

    let result = agent.run(&model, "echo abc please", &mut history, "S").await;

    assert!(result.success);
    assert_eq!(result.final_response, "done");
    assert_eq!(result.tool_calls_made, 1);
    assert_eq!(result.tools_used, vec!["echo"]);
    assert_eq!(result.iterations, 2);
    assert_eq!(executions.load(Ordering::SeqCst), 1);

    // History: user, assistant(raw call), user(framed result), assistant("done")
    assert_eq!(history.len(), 4);
    assert_eq!(history[1].content, ECHO_CALL);
    assert_eq!(
        history[2].content,
        "[TOOL_RESULT tool=echo success=true]\nabc\n[/TOOL_RESULT]\n"
    );
}

#[tokio::test]
async fn oversized_output_is_chunked() {
    struct BigTool;
    #[async_trait]
    impl Tool for BigTool {
        fn name(&self) -> &str {
            "big"
        }
        fn description(&self) -> &str {
            "Returns a lot"
        }
        async fn execute(&self, _args: &serde_json::Value) -> ToolOutcome {
            ToolOutcome::ok("y".repeat(500))
        }
    }

    let model = ScriptedModel::replies(&[r#"{"tool": "big", "arguments": {}}"#, "done"]);
    let mut agent = Agent::new(AgentConfig {
        max_tool_result_size: 100,
        ..AgentConfig::default()
    });
    agent.register_tool(Arc::new(BigTool));
    let mut history = Vec::new();

    let result = agent.run(&model, "fetch it", &mut history, "S").await;
    assert!(result.success);

    let framed = &history[2].content;
    assert!(framed.contains("chunk_1"));
    assert!(framed.contains("5 chunks"));
    assert!(framed.contains("=== Preview (first 100 characters) ==="));
    assert!(framed.contains("content_chunk"));
    assert!(framed.contains("content_search"));

    let chunker = agent.chunker();
    assert_eq!(chunker.lock().unwrap().total_chunks("chunk_1"), 5);
}

#[tokio::test]
async fn duplicate_in_same_reply_executes_once() {
    let reply = format!("{ECHO_CALL}\n{ECHO_CALL}");
    let model = ScriptedModel::replies(&[reply.as_str(), "done"]);
    let (agent, executions) = echo_agent(AgentConfig::default());
    let mut history = Vec::new();

    let result = agent.run(&model, "go", &mut history, "S").await;

    assert!(result.success);
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(result.tool_calls_made, 1);
    assert!(history[2].content.contains("Duplicate call skipped"));
}

#[tokio::test]
async fn duplicate_across_consecutive_iterations_suppressed() {
    let model = ScriptedModel::replies(&[ECHO_CALL, ECHO_CALL, "done"]);
    let (agent, executions) = echo_agent(AgentConfig::default());
    let mut history = Vec::new();

    let result = agent.run(&model, "go", &mut history, "S").await;

    assert!(result.success);
    // Exactly one execution across both iterations
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(result.tool_calls_made, 1);
    // Second iteration's result turn carries the guidance instead
    assert!(history[4].content.contains("already made in the previous iteration"));
}

#[tokio::test]
async fn pause_at_max_iterations() {
    let model = ScriptedModel::replies(&[ECHO_CALL]); // repeats forever
    let (agent, _) = echo_agent(AgentConfig {
        max_iterations: 3,
        ..AgentConfig::default()
    });
    let mut history = Vec::new();

    let result = agent.run(&model, "loop forever", &mut history, "S").await;

    assert!(!result.success);
    assert!(result.paused);
    assert_eq!(result.iterations, 3);
    let pause = result.pause_message.expect("pause message");
    assert!(pause.contains("/continue"));
    assert!(pause.contains("/cancel"));
    // Paused runs keep the history for continuation
    assert!(history.len() > 1);
}

#[tokio::test]
async fn context_limit_recovery_truncates_and_retries() {
    let model = ScriptedModel::new(vec![
        Err(ModelError::Completion("prompt exceeds context length".into())),
        Ok("recovered fine".into()),
    ]);
    // An error budget of one proves recovery does not consume it
    let agent = Agent::new(AgentConfig {
        max_consecutive_errors: 1,
        ..AgentConfig::default()
    });

    let big_result = format!(
        "[TOOL_RESULT tool=web success=true]\n{}\n[/TOOL_RESULT]",
        "z".repeat(20_000)
    );
    let mut history = vec![
        Message::user("earlier question"),
        Message::assistant("calling the tool"),
        Message::user(big_result),
    ];

    let result = agent.run(&model, "continue", &mut history, "S").await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.final_response, "recovered fine");
    // The oversized tool result was shrunk in place
    assert!(history[2].content.len() < 3000);
    assert!(history[2].content.contains("Content truncated to fit context window"));
}

#[tokio::test]
async fn model_errors_saturate_and_roll_back() {
    let model = ScriptedModel::new(vec![Err(ModelError::Network("connection refused".into()))]);
    let agent = Agent::new(AgentConfig {
        max_consecutive_errors: 2,
        ..AgentConfig::default()
    });

    let mut history = vec![Message::user("before"), Message::assistant("reply")];
    let before = history.clone();

    let result = agent.run(&model, "try it", &mut history, "S").await;

    assert!(!result.success);
    assert!(!result.paused);
    assert!(result.error.unwrap().contains("connection refused"));
    // Failed runs restore the history exactly
    assert_eq!(history, before);
}

#[tokio::test]
async fn completed_run_preserves_prior_history_prefix() {
    let model = ScriptedModel::replies(&[ECHO_CALL, "done"]);
    let (agent, _) = echo_agent(AgentConfig::default());

    let mut history = vec![
        Message::user("first question"),
        Message::assistant("first answer"),
    ];
    let before = history.clone();

    let result = agent.run(&model, "second question", &mut history, "S").await;

    assert!(result.success);
    assert!(history.len() >= before.len());
    assert_eq!(&history[..before.len()], &before[..]);
}

#[tokio::test]
async fn unconfigured_model_fails_before_history_mutation() {
    let mut model = ScriptedModel::replies(&["never called"]);
    model.configured = false;
    let agent = Agent::new(AgentConfig::default());

    let mut history = vec![Message::user("existing")];
    let result = agent.run(&model, "hi", &mut history, "S").await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Model not configured"));
    assert_eq!(result.iterations, 0);
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn intent_without_call_gets_goaded() {
    let model = ScriptedModel::replies(&["Let me check the file now.", ECHO_CALL, "done"]);
    let (agent, executions) = echo_agent(AgentConfig::default());
    let mut history = Vec::new();

    let result = agent.run(&model, "check it", &mut history, "S").await;

    assert!(result.success);
    assert_eq!(result.final_response, "done");
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    // The goad turn sits between the planning reply and the actual call
    assert_eq!(history[1].content, "Let me check the file now.");
    assert_eq!(history[2].role, Role::User);
    assert!(history[2].content.contains("ACT NOW"));
}

#[tokio::test]
async fn question_terminates_without_goad() {
    let model = ScriptedModel::replies(&["Which file do you want me to check?"]);
    let (agent, executions) = echo_agent(AgentConfig::default());
    let mut history = Vec::new();

    let result = agent.run(&model, "check it", &mut history, "S").await;

    assert!(result.success);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.final_response, "Which file do you want me to check?");
    assert_eq!(executions.load(Ordering::SeqCst), 0);
    // No goad turn was appended
    assert!(!history.iter().any(|m| m.content.contains("ACT NOW")));
}

#[tokio::test]
async fn plain_answer_never_goaded() {
    // Monotonicity: no intent phrase in the reply, no goad turn
    let model = ScriptedModel::replies(&["The capital of France is Paris."]);
    let (agent, _) = echo_agent(AgentConfig::default());
    let mut history = Vec::new();

    let result = agent.run(&model, "capital of France?", &mut history, "S").await;

    assert!(result.success);
    assert_eq!(result.iterations, 1);
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn stop_outcome_ends_loop() {
    struct StopTool;
    #[async_trait]
    impl Tool for StopTool {
        fn name(&self) -> &str {
            "finish"
        }
        fn description(&self) -> &str {
            "Finishes the task"
        }
        async fn execute(&self, _args: &serde_json::Value) -> ToolOutcome {
            ToolOutcome::stop("all wrapped up")
        }
    }

    let model = ScriptedModel::replies(&[
        r#"Wrapping up now. {"tool": "finish", "arguments": {}}"#,
    ]);
    let mut agent = Agent::new(AgentConfig::default());
    agent.register_tool(Arc::new(StopTool));
    let mut history = Vec::new();

    let result = agent.run(&model, "finish it", &mut history, "S").await;

    assert!(result.success);
    assert!(!result.paused);
    assert_eq!(result.iterations, 1);
    // Final response is the non-tool text of the reply
    assert_eq!(result.final_response, "Wrapping up now.");
}

#[tokio::test]
async fn failing_tool_result_fed_back_to_model() {
    struct FailTool;
    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "flaky"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        async fn execute(&self, _args: &serde_json::Value) -> ToolOutcome {
            ToolOutcome::fail("disk on fire")
        }
    }

    let model = ScriptedModel::replies(&[r#"{"tool": "flaky", "arguments": {}}"#, "I see, giving up"]);
    let mut agent = Agent::new(AgentConfig::default());
    agent.register_tool(Arc::new(FailTool));
    let mut history = Vec::new();

    let result = agent.run(&model, "try the flaky thing", &mut history, "S").await;

    // Tool failure is surfaced to the model, not the caller
    assert!(result.success);
    assert!(history[2]
        .content
        .contains("[TOOL_RESULT tool=flaky success=false]\nError: disk on fire"));
}
