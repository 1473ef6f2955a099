use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

// ── Phase enums ──

/// Lifecycle of one model run, advanced once per runner callback.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Queued,
    Streaming,
    Completed,
    Errored,
}

/// Lifecycle of the automation step within one call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AutomationPhase {
    #[default]
    NotAttempted,
    Resolving,
    Skipped,
    Executing,
    Succeeded,
    Failed,
}

// ── Valid transitions ──

const RUN_TRANSITIONS: &[(RunPhase, &[RunPhase])] = &[
    (
        RunPhase::Queued,
        &[RunPhase::Streaming, RunPhase::Completed, RunPhase::Errored],
    ),
    (
        RunPhase::Streaming,
        &[RunPhase::Streaming, RunPhase::Completed, RunPhase::Errored],
    ),
    // Completed and Errored are terminal
];

const AUTOMATION_TRANSITIONS: &[(AutomationPhase, &[AutomationPhase])] = &[
    (AutomationPhase::NotAttempted, &[AutomationPhase::Resolving]),
    (
        AutomationPhase::Resolving,
        &[AutomationPhase::Skipped, AutomationPhase::Executing],
    ),
    (
        AutomationPhase::Executing,
        &[AutomationPhase::Succeeded, AutomationPhase::Failed],
    ),
    // Skipped, Succeeded and Failed are terminal
];

fn is_valid<T: PartialEq + Copy>(table: &[(T, &[T])], from: T, to: T) -> bool {
    table
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Errored)
    }

    /// Move to `to`, rejecting transitions the table does not list.
    pub fn advance(&mut self, to: RunPhase) -> Result<()> {
        if !is_valid(RUN_TRANSITIONS, *self, to) {
            bail!("invalid run transition: {:?} → {to:?}", *self);
        }
        *self = to;
        Ok(())
    }
}

impl AutomationPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AutomationPhase::Skipped | AutomationPhase::Succeeded | AutomationPhase::Failed
        )
    }

    pub fn advance(&mut self, to: AutomationPhase) -> Result<()> {
        if !is_valid(AUTOMATION_TRANSITIONS, *self, to) {
            bail!("invalid automation transition: {:?} → {to:?}", *self);
        }
        *self = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_happy_path() {
        let mut phase = RunPhase::default();
        phase.advance(RunPhase::Streaming).unwrap();
        phase.advance(RunPhase::Streaming).unwrap();
        phase.advance(RunPhase::Completed).unwrap();
        assert!(phase.is_terminal());
    }

    #[test]
    fn run_may_complete_without_deltas() {
        let mut phase = RunPhase::Queued;
        phase.advance(RunPhase::Completed).unwrap();
        assert_eq!(phase, RunPhase::Completed);
    }

    #[test]
    fn run_terminal_states_reject_everything() {
        for terminal in [RunPhase::Completed, RunPhase::Errored] {
            for to in [
                RunPhase::Queued,
                RunPhase::Streaming,
                RunPhase::Completed,
                RunPhase::Errored,
            ] {
                let mut phase = terminal;
                assert!(phase.advance(to).is_err(), "{terminal:?} → {to:?}");
                assert_eq!(phase, terminal);
            }
        }
    }

    #[test]
    fn run_cannot_go_back_to_queued() {
        let mut phase = RunPhase::Streaming;
        assert!(phase.advance(RunPhase::Queued).is_err());
    }

    #[test]
    fn automation_skip_path() {
        let mut phase = AutomationPhase::default();
        phase.advance(AutomationPhase::Resolving).unwrap();
        phase.advance(AutomationPhase::Skipped).unwrap();
        assert!(phase.is_terminal());
        assert!(phase.advance(AutomationPhase::Executing).is_err());
    }

    #[test]
    fn automation_execute_path() {
        let mut phase = AutomationPhase::NotAttempted;
        phase.advance(AutomationPhase::Resolving).unwrap();
        phase.advance(AutomationPhase::Executing).unwrap();
        phase.advance(AutomationPhase::Failed).unwrap();
        assert_eq!(phase, AutomationPhase::Failed);
    }

    #[test]
    fn automation_must_resolve_first() {
        let mut phase = AutomationPhase::NotAttempted;
        assert!(phase.advance(AutomationPhase::Executing).is_err());
        assert!(phase.advance(AutomationPhase::Skipped).is_err());
    }

    #[test]
    fn phases_serialize() {
        assert_eq!(
            serde_json::to_string(&AutomationPhase::NotAttempted).unwrap(),
            "\"not-attempted\""
        );
        assert_eq!(serde_json::to_string(&RunPhase::Errored).unwrap(), "\"errored\"");
    }
}
