//! Shell tool — execute system commands inside the jail.
//!
//! Commands run under `sh -c` with an OS-level timeout. A timeout or a
//! nonzero exit is reported as a *successful* tool result carrying the
//! diagnostics, so the model can read the output and try a different
//! approach instead of the loop aborting. The sandbox, once active, is
//! the actual confinement boundary; the substring blocklist here only
//! short-circuits the obvious catastrophes.

use crate::args;
use async_trait::async_trait;
use opencrank_core::tool::{Tool, ToolOutcome, ToolParam};
use opencrank_security::path::resolve_path;
use opencrank_security::Sandbox;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Output beyond this many bytes is cut off.
const MAX_OUTPUT_BYTES: usize = 100_000;

/// Patterns rejected outright, before the sandbox even sees them.
const BLOCKED_PATTERNS: &[&str] = &["rm -rf /", "rm -rf ~", ":(){"];

pub struct ShellTool {
    workspace: PathBuf,
    timeout_secs: u64,
}

impl ShellTool {
    pub fn new(workspace: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            workspace: workspace.into(),
            timeout_secs,
        }
    }

    fn is_blocked(command: &str) -> bool {
        let lower = command.to_lowercase();
        BLOCKED_PATTERNS.iter().any(|p| lower.contains(p))
    }

    /// `curl` invocations without an explicit timeout get one injected
    /// so a dead endpoint cannot stall the whole iteration.
    fn add_curl_timeout(command: &str) -> String {
        if let Some(curl_pos) = command.find("curl ")
            && !command.contains("--connect-timeout")
            && !command.contains("-m ")
            && !command.contains("--max-time")
        {
            let insert_at = curl_pos + 5;
            let patched = format!(
                "{}--connect-timeout 10 --max-time 15 {}",
                &command[..insert_at],
                &command[insert_at..]
            );
            debug!(command = %patched, "Auto-added timeout to curl");
            return patched;
        }
        command.to_string()
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its output. \
         Use this for running scripts, checking system state, or executing programs."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::string("command", "The shell command to execute", true),
            ToolParam::string("workdir", "Working directory (optional)", false),
        ]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let command = match args::required_str(arguments, "command") {
            Ok(c) => c,
            Err(e) => return ToolOutcome::fail(e),
        };

        if Self::is_blocked(command) {
            return ToolOutcome::fail("Command blocked for safety");
        }
        let command = Self::add_curl_timeout(command);

        let mut workdir = match args::optional_str(arguments, "workdir") {
            Some(dir) => resolve_path(dir, &self.workspace),
            None => self.workspace.clone(),
        };

        // The sandbox wins over whatever workdir the model asked for
        let sandbox = Sandbox::global();
        if sandbox.is_active() && !sandbox.is_path_allowed(&workdir) {
            warn!(workdir = %workdir.display(), "Workdir outside sandbox, forcing to jail");
            workdir = sandbox.jail_dir();
        }

        info!(command = %command, workdir = %workdir.display(), "Executing shell command");

        let mut child = Command::new("sh");
        child
            .arg("-c")
            .arg(&command)
            .current_dir(&workdir)
            .kill_on_drop(true);

        let output = match tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolOutcome::fail(format!("Failed to execute command: {e}")),
            Err(_) => {
                // Recoverable: the model should adjust, not the loop die
                return ToolOutcome::ok(format!(
                    "Command timed out after {} seconds.\n\
                     Try an alternative approach or different service.",
                    self.timeout_secs
                ));
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        if combined.len() > MAX_OUTPUT_BYTES {
            let mut cut = MAX_OUTPUT_BYTES;
            while !combined.is_char_boundary(cut) {
                cut -= 1;
            }
            combined.truncate(cut);
            combined.push_str("\n... [output truncated] ...");
        }

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            let mut body = format!("Command exited with code {code}");
            if !combined.is_empty() {
                body.push_str(":\n");
                body.push_str(&combined);
            }
            // Returned as success so the model can see the output and retry
            return ToolOutcome::ok(body);
        }

        if combined.is_empty() {
            combined = "(no output)".into();
        }
        ToolOutcome::ok(combined)
    }
}
