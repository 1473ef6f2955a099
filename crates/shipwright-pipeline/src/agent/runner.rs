use std::path::PathBuf;

use shipwright_core::session::Message;
use shipwright_core::{CostData, TokenUsage, ToolUseRecord};
use tokio_util::sync::CancellationToken;

use crate::credential::Credential;

/// Failure reported by a model runner, through `on_error` or as the
/// returned error.
#[derive(Debug, Clone, Default, thiserror::Error)]
#[error("{message}")]
pub struct RunnerFailure {
    pub message: String,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
    /// Set when the runner stopped because its cancellation token fired.
    pub cancelled: bool,
}

impl RunnerFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            message: "run cancelled".into(),
            cancelled: true,
            ..Default::default()
        }
    }
}

/// Callbacks a runner invokes while streaming. Implementations must return
/// quickly; they run on the runner's task.
pub trait RunObserver: Send + Sync {
    fn on_start(&self);
    /// `output_tokens` is the runner's running total, or an estimate.
    fn on_delta(&self, text: &str, output_tokens: u64);
    fn on_complete(&self);
    fn on_error(&self, failure: &RunnerFailure);
}

/// Per-call runner options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub session_id: String,
    pub operation_id: String,
    pub workspace_path: Option<PathBuf>,
    pub credential: Option<Credential>,
    pub cancel: CancellationToken,
    /// Conversation so far, oldest first.
    pub prior_messages: Vec<Message>,
    pub model_override: Option<String>,
}

/// What a runner reports once the run returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerOutput {
    pub full_text: Option<String>,
    pub usage: Option<TokenUsage>,
    /// Model-level stop reason (`end_turn`, `max_tokens`, ...).
    pub stop_reason: Option<String>,
    pub tool_use: Vec<ToolUseRecord>,
    pub cost: Option<CostData>,
}

/// Trait for model runners. Implemented by `ClaudeCodeRunner` and
/// `MockRunner` (tests).
#[async_trait::async_trait]
pub trait ModelRunner: Send + Sync {
    async fn run_prompt(
        &self,
        prompt: &str,
        options: RunOptions,
        observer: &dyn RunObserver,
    ) -> anyhow::Result<RunnerOutput>;
}

/// Scripted reply for [`MockRunner`].
#[derive(Debug, Clone, Default)]
pub struct MockReply {
    pub deltas: Vec<String>,
    pub output: RunnerOutput,
    /// Reported through `on_error`.
    pub error: Option<RunnerFailure>,
    /// Return the error instead of `Ok(output)`.
    pub return_err: bool,
}

impl MockReply {
    /// Stream `text` as a single delta and report it as the full text.
    pub fn text(text: &str) -> Self {
        Self {
            deltas: vec![text.to_string()],
            output: RunnerOutput {
                full_text: Some(text.to_string()),
                stop_reason: Some("end_turn".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Stream deltas without reporting full text or usage.
    pub fn deltas(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Report `failure` through `on_error` and return it as the error.
    pub fn fail(failure: RunnerFailure) -> Self {
        Self {
            error: Some(failure),
            return_err: true,
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, input: u64, output: u64) -> Self {
        self.output.usage = Some(TokenUsage { input, output });
        self
    }
}

/// Mock runner for testing. Pops one reply per call; when exhausted,
/// replies with "(mock) done".
#[derive(Default)]
pub struct MockRunner {
    replies: std::sync::Mutex<Vec<MockReply>>,
    calls: std::sync::Mutex<Vec<(String, RunOptions)>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies),
            ..Default::default()
        }
    }

    pub fn push(&self, reply: MockReply) {
        self.replies.lock().unwrap().push(reply);
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<(String, RunOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ModelRunner for MockRunner {
    async fn run_prompt(
        &self,
        prompt: &str,
        options: RunOptions,
        observer: &dyn RunObserver,
    ) -> anyhow::Result<RunnerOutput> {
        let cancel = options.cancel.clone();
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), options));

        if cancel.is_cancelled() {
            let failure = RunnerFailure::cancelled();
            observer.on_error(&failure);
            return Err(failure.into());
        }

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                MockReply::text("(mock) done")
            } else {
                replies.remove(0)
            }
        };

        observer.on_start();
        let mut streamed = 0usize;
        for delta in &reply.deltas {
            streamed += delta.chars().count();
            observer.on_delta(delta, streamed.div_ceil(4) as u64);
        }
        if let Some(failure) = &reply.error {
            observer.on_error(failure);
            if reply.return_err {
                return Err(failure.clone().into());
            }
        } else {
            observer.on_complete();
        }
        Ok(reply.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(std::sync::Mutex<Vec<String>>);

    impl RunObserver for Recorder {
        fn on_start(&self) {
            self.0.lock().unwrap().push("start".into());
        }
        fn on_delta(&self, text: &str, tokens: u64) {
            self.0.lock().unwrap().push(format!("delta:{text}:{tokens}"));
        }
        fn on_complete(&self) {
            self.0.lock().unwrap().push("complete".into());
        }
        fn on_error(&self, failure: &RunnerFailure) {
            self.0.lock().unwrap().push(format!("error:{}", failure.message));
        }
    }

    #[tokio::test]
    async fn mock_default_reply() {
        let runner = MockRunner::new();
        let rec = Recorder::default();
        let out = runner
            .run_prompt("hi", RunOptions::default(), &rec)
            .await
            .unwrap();
        assert_eq!(out.full_text.as_deref(), Some("(mock) done"));
        assert_eq!(
            *rec.0.lock().unwrap(),
            vec!["start", "delta:(mock) done:3", "complete"]
        );
        assert_eq!(runner.prompts(), vec!["hi"]);
    }

    #[tokio::test]
    async fn mock_pops_in_order() {
        let runner = MockRunner::with_replies(vec![
            MockReply::fail(RunnerFailure::new("boom")),
            MockReply::text("second"),
        ]);
        let rec = Recorder::default();
        let err = runner
            .run_prompt("a", RunOptions::default(), &rec)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        let out = runner
            .run_prompt("b", RunOptions::default(), &rec)
            .await
            .unwrap();
        assert_eq!(out.full_text.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn mock_respects_cancel() {
        let runner = MockRunner::with_replies(vec![MockReply::text("never")]);
        let options = RunOptions::default();
        options.cancel.cancel();
        let rec = Recorder::default();
        let err = runner.run_prompt("x", options, &rec).await.unwrap_err();
        let failure = err.downcast_ref::<RunnerFailure>().unwrap();
        assert!(failure.cancelled);
        assert_eq!(*rec.0.lock().unwrap(), vec!["error:run cancelled"]);
    }
}
