use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use shipwright_core::session::{Message, Role};
use tokio::io::{AsyncReadExt, BufReader};

use crate::agent::runner::{ModelRunner, RunObserver, RunOptions, RunnerFailure, RunnerOutput};
use crate::agent::stream::{into_output, StreamMonitor};
use crate::redact::{mask_secrets, truncate_chars};

const STDERR_LIMIT: usize = 4000;

/// Runs prompts through the Claude Code CLI (`claude -p`).
pub struct ClaudeCodeRunner {
    pub claude_bin: PathBuf,
    pub timeout: Duration,
    /// Raw stdout goes to `{transcript_dir}/{operation_id}.jsonl` when set.
    pub transcript_dir: Option<PathBuf>,
    pub permission_mode: String,
}

impl Default for ClaudeCodeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaudeCodeRunner {
    pub fn new() -> Self {
        Self {
            claude_bin: PathBuf::from("claude"),
            timeout: Duration::from_secs(1800),
            transcript_dir: None,
            permission_mode: "acceptEdits".into(),
        }
    }

    pub fn with_bin(mut self, claude_bin: PathBuf) -> Self {
        self.claude_bin = claude_bin;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_transcripts(mut self, dir: Option<PathBuf>) -> Self {
        self.transcript_dir = dir;
        self
    }

    /// Check that the Claude CLI binary is reachable.
    pub fn verify_available(&self) -> Result<()> {
        let status = std::process::Command::new(&self.claude_bin)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => Ok(()),
            _ => anyhow::bail!(
                "Claude CLI not found (looked for {:?}).\n\
                 Install: npm install -g @anthropic-ai/claude-code",
                self.claude_bin
            ),
        }
    }
}

/// Render prior turns as a system-prompt appendix.
pub fn history_appendix(messages: &[Message]) -> Option<String> {
    if messages.is_empty() {
        return None;
    }
    let mut out = String::from("Conversation so far:\n");
    for m in messages {
        let who = match m.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        out.push_str(&format!("\n{who}: {}\n", m.content.trim()));
    }
    Some(out)
}

#[async_trait::async_trait]
impl ModelRunner for ClaudeCodeRunner {
    async fn run_prompt(
        &self,
        prompt: &str,
        options: RunOptions,
        observer: &dyn RunObserver,
    ) -> Result<RunnerOutput> {
        let mut cmd = tokio::process::Command::new(&self.claude_bin);
        cmd.arg("-p")
            .arg(prompt)
            .arg("--verbose")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--permission-mode")
            .arg(&self.permission_mode)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            // Allow nesting inside another Claude Code session.
            .env_remove("CLAUDE_CODE")
            .env_remove("CLAUDECODE");

        if let Some(dir) = &options.workspace_path {
            cmd.current_dir(dir);
        }
        if let Some(model) = &options.model_override {
            cmd.arg("--model").arg(model);
        }
        if let Some(history) = history_appendix(&options.prior_messages) {
            cmd.arg("--append-system-prompt").arg(history);
        }
        if let Some(credential) = &options.credential {
            cmd.env("ANTHROPIC_API_KEY", credential.expose());
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", self.claude_bin.display()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to capture stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to capture stderr"))?;
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        observer.on_start();
        tracing::debug!(
            operation_id = %options.operation_id,
            session_id = %options.session_id,
            "claude run started"
        );

        let tee = self
            .transcript_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.jsonl", options.operation_id)));
        let mut monitor = StreamMonitor::new(BufReader::new(stdout)).with_tee(tee);

        let outcome = tokio::select! {
            result = monitor.run(observer) => {
                let monitor_result = result?;
                let exit = child.wait().await?;
                into_output(monitor_result, exit.code())
            }
            _ = tokio::time::sleep(self.timeout) => {
                child.kill().await.ok();
                Err(RunnerFailure::new(format!(
                    "run timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
            _ = options.cancel.cancelled() => {
                child.kill().await.ok();
                Err(RunnerFailure::cancelled())
            }
        };

        match outcome {
            Ok(output) => {
                observer.on_complete();
                Ok(output)
            }
            Err(mut failure) => {
                let stderr = stderr_task.await.unwrap_or_default();
                if !stderr.trim().is_empty() {
                    failure.stderr = Some(truncate_chars(&mask_secrets(stderr.trim()), STDERR_LIMIT));
                }
                observer.on_error(&failure);
                Err(failure.into())
            }
        }
    }
}
