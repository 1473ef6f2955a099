use std::sync::Mutex;

use shipwright_core::{RunResult, TokenUsage};
use time::OffsetDateTime;

use crate::agent::runner::{ModelRunner, RunObserver, RunOptions, RunnerFailure};
use crate::clock::{elapsed_ms, Clock};
use crate::runner::notify::{ProgressEvent, ProgressSink, ProgressStatus};
use crate::state::RunPhase;

/// Outcome of one model run, before classification.
#[derive(Debug, Clone)]
pub struct ExecutedRun {
    pub result: RunResult,
    /// Set when the runner returned an error or reported one via `on_error`.
    pub failure: Option<RunnerFailure>,
    pub phase: RunPhase,
    pub started_at: OffsetDateTime,
    pub duration_ms: u64,
}

/// Coarse progress percentage from output tokens so far.
pub fn progress_bucket(output_tokens: u64) -> u8 {
    match output_tokens {
        0 => 5,
        1..=99 => 10,
        100..=499 => 25,
        500..=1499 => 50,
        1500..=3999 => 75,
        _ => 90,
    }
}

#[derive(Default)]
struct TrackerState {
    phase: RunPhase,
    text: String,
    output_tokens: u64,
    failure: Option<RunnerFailure>,
}

/// Accumulates callback data and drives the run state machine.
struct RunTracker<'a> {
    operation_id: &'a str,
    sink: &'a dyn ProgressSink,
    state: Mutex<TrackerState>,
}

impl<'a> RunTracker<'a> {
    fn new(operation_id: &'a str, sink: &'a dyn ProgressSink) -> Self {
        Self {
            operation_id,
            sink,
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn emit(&self, status: ProgressStatus, text: Option<String>, progress: u8, message: &str) {
        self.sink.emit(ProgressEvent {
            operation_id: self.operation_id.to_string(),
            status,
            text,
            progress,
            message: Some(message.to_string()),
        });
    }

    /// Advance the phase; out-of-order callbacks are logged and dropped.
    fn advance(state: &mut TrackerState, to: RunPhase) -> bool {
        match state.phase.advance(to) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring runner callback");
                false
            }
        }
    }

    fn finish(self, ok: bool) -> TrackerState {
        let mut state = self.state.into_inner().unwrap_or_else(|p| p.into_inner());
        if !state.phase.is_terminal() {
            let to = if ok { RunPhase::Completed } else { RunPhase::Errored };
            if state.phase.advance(to).is_ok() {
                let (status, progress, message) = if ok {
                    (ProgressStatus::Completed, 100, "completed")
                } else {
                    (ProgressStatus::Failed, progress_bucket(state.output_tokens), "failed")
                };
                self.sink.emit(ProgressEvent {
                    operation_id: self.operation_id.to_string(),
                    status,
                    text: None,
                    progress,
                    message: Some(message.to_string()),
                });
            }
        }
        state
    }
}

impl RunObserver for RunTracker<'_> {
    fn on_start(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if Self::advance(&mut state, RunPhase::Streaming) {
            drop(state);
            self.emit(ProgressStatus::Working, None, progress_bucket(0), "working");
        }
    }

    fn on_delta(&self, text: &str, output_tokens: u64) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if !Self::advance(&mut state, RunPhase::Streaming) {
            return;
        }
        state.text.push_str(text);
        state.output_tokens = state.output_tokens.max(output_tokens);
        let cumulative = state.text.clone();
        let progress = progress_bucket(state.output_tokens);
        drop(state);
        self.emit(ProgressStatus::Working, Some(cumulative), progress, "streaming");
    }

    fn on_complete(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if Self::advance(&mut state, RunPhase::Completed) {
            drop(state);
            self.emit(ProgressStatus::Completed, None, 100, "completed");
        }
    }

    fn on_error(&self, failure: &RunnerFailure) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.failure.is_none() {
            state.failure = Some(failure.clone());
        }
        let progress = progress_bucket(state.output_tokens);
        if Self::advance(&mut state, RunPhase::Errored) {
            drop(state);
            self.emit(ProgressStatus::Failed, None, progress, "failed");
        }
    }
}

/// Run the prompt through `runner`, streaming progress into `sink`.
///
/// Never returns an error: runner failures come back in
/// [`ExecutedRun::failure`] for the classifier.
pub async fn execute_run(
    runner: &dyn ModelRunner,
    prompt: &str,
    options: RunOptions,
    estimated_input_tokens: u64,
    sink: &dyn ProgressSink,
    clock: &dyn Clock,
) -> ExecutedRun {
    let operation_id = options.operation_id.clone();
    let tracker = RunTracker::new(&operation_id, sink);
    tracker.emit(ProgressStatus::Queued, None, 0, "queued");
    let started_at = clock.now();

    let outcome = runner.run_prompt(prompt, options, &tracker).await;

    let (output, returned_failure) = match outcome {
        Ok(output) => (Some(output), None),
        Err(e) => {
            let failure = e
                .downcast_ref::<RunnerFailure>()
                .cloned()
                .unwrap_or_else(|| RunnerFailure::new(format!("{e:#}")));
            (None, Some(failure))
        }
    };
    let captured_failure = tracker
        .state
        .lock()
        .ok()
        .and_then(|s| s.failure.clone());
    // A failure reported through on_error wins over one reconstructed from
    // the returned error; it carries the runner's own stderr and exit code.
    let failure = captured_failure.or(returned_failure);
    let state = tracker.finish(failure.is_none());
    let duration_ms = elapsed_ms(clock, started_at);

    let output = output.unwrap_or_default();
    let text = output
        .full_text
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(state.text);
    let usage = output.usage.unwrap_or(TokenUsage {
        input: estimated_input_tokens,
        output: state.output_tokens,
    });

    ExecutedRun {
        result: RunResult {
            text,
            usage,
            stop_reason: output.stop_reason,
            tool_use: output.tool_use,
            cost: output.cost,
        },
        failure,
        phase: state.phase,
        started_at,
        duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::runner::{MockReply, MockRunner};
    use crate::clock::FixedClock;
    use crate::runner::notify::CollectSink;

    fn options() -> RunOptions {
        RunOptions {
            operation_id: "op_1".into(),
            session_id: "s1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn buckets() {
        assert_eq!(progress_bucket(0), 5);
        assert_eq!(progress_bucket(50), 10);
        assert_eq!(progress_bucket(100), 25);
        assert_eq!(progress_bucket(1000), 50);
        assert_eq!(progress_bucket(2000), 75);
        assert_eq!(progress_bucket(10_000), 90);
    }

    #[tokio::test]
    async fn prefers_runner_full_text_and_usage() {
        let runner = MockRunner::with_replies(vec![MockReply {
            deltas: vec!["partial ".into(), "stream".into()],
            output: crate::agent::runner::RunnerOutput {
                full_text: Some("final answer".into()),
                usage: Some(TokenUsage {
                    input: 10,
                    output: 20,
                }),
                ..Default::default()
            },
            ..Default::default()
        }]);
        let sink = CollectSink::new();
        let clock = FixedClock::at_epoch_2026();
        let run = execute_run(&runner, "p", options(), 99, &sink, &clock).await;
        assert!(run.failure.is_none());
        assert_eq!(run.result.text, "final answer");
        assert_eq!(run.result.usage, TokenUsage { input: 10, output: 20 });
        assert_eq!(run.phase, RunPhase::Completed);
    }

    #[tokio::test]
    async fn falls_back_to_accumulated_text_and_estimate() {
        let runner = MockRunner::with_replies(vec![MockReply::deltas(&["Hello ", "world"])]);
        let sink = CollectSink::new();
        let clock = FixedClock::at_epoch_2026();
        let run = execute_run(&runner, "p", options(), 42, &sink, &clock).await;
        assert_eq!(run.result.text, "Hello world");
        assert_eq!(run.result.usage.input, 42);
        assert_eq!(run.result.usage.output, 3);
    }

    #[tokio::test]
    async fn progress_sequence() {
        let runner = MockRunner::with_replies(vec![MockReply::deltas(&["a", "b"])]);
        let sink = CollectSink::new();
        let clock = FixedClock::at_epoch_2026();
        execute_run(&runner, "p", options(), 0, &sink, &clock).await;
        assert_eq!(
            sink.statuses(),
            vec![
                ProgressStatus::Queued,
                ProgressStatus::Working,
                ProgressStatus::Working,
                ProgressStatus::Working,
                ProgressStatus::Completed,
            ]
        );
        let events = sink.events();
        assert_eq!(events[3].text.as_deref(), Some("ab"));
        assert_eq!(events.last().unwrap().progress, 100);
    }

    #[tokio::test]
    async fn returned_error_is_failure() {
        let runner =
            MockRunner::with_replies(vec![MockReply::fail(RunnerFailure::new("rate limit"))]);
        let sink = CollectSink::new();
        let clock = FixedClock::at_epoch_2026();
        let run = execute_run(&runner, "p", options(), 0, &sink, &clock).await;
        assert_eq!(run.failure.unwrap().message, "rate limit");
        assert_eq!(run.phase, RunPhase::Errored);
        assert_eq!(sink.statuses().last(), Some(&ProgressStatus::Failed));
    }

    #[tokio::test]
    async fn captured_on_error_counts_even_when_runner_returns_ok() {
        let runner = MockRunner::with_replies(vec![MockReply {
            deltas: vec!["x".into()],
            error: Some(RunnerFailure::new("stream broke")),
            return_err: false,
            ..Default::default()
        }]);
        let sink = CollectSink::new();
        let clock = FixedClock::at_epoch_2026();
        let run = execute_run(&runner, "p", options(), 0, &sink, &clock).await;
        assert_eq!(run.failure.unwrap().message, "stream broke");
        assert_eq!(run.phase, RunPhase::Errored);
    }

    #[tokio::test]
    async fn runner_without_callbacks_still_completes() {
        struct Quiet;
        #[async_trait::async_trait]
        impl ModelRunner for Quiet {
            async fn run_prompt(
                &self,
                _prompt: &str,
                _options: RunOptions,
                _observer: &dyn RunObserver,
            ) -> anyhow::Result<crate::agent::runner::RunnerOutput> {
                Ok(crate::agent::runner::RunnerOutput {
                    full_text: Some("ok".into()),
                    ..Default::default()
                })
            }
        }
        let sink = CollectSink::new();
        let clock = FixedClock::at_epoch_2026();
        let run = execute_run(&Quiet, "p", options(), 0, &sink, &clock).await;
        assert_eq!(run.phase, RunPhase::Completed);
        assert_eq!(
            sink.statuses(),
            vec![ProgressStatus::Queued, ProgressStatus::Completed]
        );
    }

    #[tokio::test]
    async fn plain_anyhow_error_becomes_failure() {
        struct Broken;
        #[async_trait::async_trait]
        impl ModelRunner for Broken {
            async fn run_prompt(
                &self,
                _prompt: &str,
                _options: RunOptions,
                _observer: &dyn RunObserver,
            ) -> anyhow::Result<crate::agent::runner::RunnerOutput> {
                anyhow::bail!("spawning claude: not found")
            }
        }
        let sink = CollectSink::new();
        let clock = FixedClock::at_epoch_2026();
        let run = execute_run(&Broken, "p", options(), 0, &sink, &clock).await;
        assert!(run.failure.unwrap().message.contains("not found"));
    }
}
