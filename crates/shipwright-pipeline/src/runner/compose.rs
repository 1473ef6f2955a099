use serde::{Deserialize, Serialize};
use serde_json::json;
use shipwright_core::automation::{AutomationResult, AutomationStatus, LegacyAutomationSummary};
use shipwright_core::error::{ClassifiedError, ErrorCode};
use shipwright_core::session::Message;
use shipwright_core::{CostData, RunResult, StopReason, TokenUsage, ToolUseRecord};

use crate::agent::classify::RunDiagnostics;
use crate::git::changes::ChangeSnapshot;
use crate::git::patch::PatchReport;
use crate::workspace::WorkspacePlan;

/// What the caller learns about the workspace the model ran in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub ephemeral: bool,
    pub repo_ensured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

impl WorkspaceReport {
    pub fn from_plan(plan: &WorkspacePlan) -> Self {
        Self {
            path: plan
                .workspace
                .as_ref()
                .map(|w| w.path.display().to_string()),
            ephemeral: plan.workspace.as_ref().is_some_and(|w| w.ephemeral),
            repo_ensured: plan.repo_ensured,
            repository: plan.repository.as_ref().map(|r| r.value.full_name()),
            repository_source: plan.repository.as_ref().map(|r| r.source.to_string()),
            logs: plan.logs.clone(),
        }
    }
}

/// Structured outcome of one `process_prompt` call.
///
/// The call succeeding says nothing about the repository: check
/// `stop_reason`, `automation.status` and `patches`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptResult {
    pub operation_id: String,
    pub session_id: String,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
    pub summary: String,
    /// Stop reason reported by the model itself (`end_turn`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_use: Vec<ToolUseRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<RunDiagnostics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patches: Option<PatchReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation: Option<AutomationResult>,
    /// Older summary shape, present only when automation succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_automation: Option<LegacyAutomationSummary>,
    /// User and assistant turns produced by this call, in order.
    #[serde(default)]
    pub new_messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Pieces gathered by the pipeline. Absent stages stay `None`.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub operation_id: String,
    pub session_id: String,
    pub run: RunResult,
    pub error: Option<ClassifiedError>,
    pub diagnostics: Option<RunDiagnostics>,
    pub workspace: Option<WorkspaceReport>,
    pub patches: Option<PatchReport>,
    pub changes: Option<ChangeSnapshot>,
    pub automation: Option<AutomationResult>,
    pub warnings: Vec<String>,
    pub user_text: String,
    pub user_at: String,
    pub assistant_at: String,
}

fn stop_reason_of(error: Option<&ClassifiedError>) -> StopReason {
    match error.map(|e| e.code) {
        None => StopReason::Completed,
        Some(ErrorCode::Cancelled) => StopReason::Cancelled,
        Some(_) => StopReason::Error,
    }
}

fn stop_reason_str(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Completed => "completed",
        StopReason::Cancelled => "cancelled",
        StopReason::Error => "error",
    }
}

/// Merge every stage into one result, including the two new turns.
pub fn compose(outcome: Outcome) -> PromptResult {
    let stop_reason = stop_reason_of(outcome.error.as_ref());
    let summary = outcome.run.text.trim().to_string();

    let user = Message::user(outcome.user_text, outcome.user_at);
    let assistant_text = match (&outcome.error, summary.is_empty()) {
        (Some(e), true) => format!("[{}] {}", e.code, e.message),
        _ => summary.clone(),
    };
    let mut assistant = Message::assistant(assistant_text, outcome.assistant_at);
    assistant.tool_use = outcome.run.tool_use.clone();
    assistant.metadata = Some(json!({
        "operationId": outcome.operation_id,
        "stopReason": stop_reason_str(stop_reason),
    }));

    let github_automation = outcome
        .automation
        .as_ref()
        .filter(|a| a.status == AutomationStatus::Success)
        .map(AutomationResult::legacy_summary);

    PromptResult {
        operation_id: outcome.operation_id,
        session_id: outcome.session_id,
        stop_reason,
        usage: outcome.run.usage,
        summary,
        model_stop_reason: outcome.run.stop_reason,
        tool_use: outcome.run.tool_use,
        cost: outcome.run.cost,
        error: outcome.error,
        diagnostics: outcome.diagnostics,
        workspace: outcome.workspace,
        patches: outcome.patches,
        changes: outcome.changes,
        automation: outcome.automation,
        github_automation,
        new_messages: vec![user, assistant],
        warnings: outcome.warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_core::automation::AutomationDiagnostics;
    use shipwright_core::session::Role;

    fn outcome(text: &str) -> Outcome {
        Outcome {
            operation_id: "op_1".into(),
            session_id: "s1".into(),
            run: RunResult {
                text: text.into(),
                usage: TokenUsage {
                    input: 3,
                    output: 4,
                },
                ..Default::default()
            },
            user_text: "fix typo".into(),
            user_at: "t0".into(),
            assistant_at: "t1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn minimal_success_shape() {
        let result = compose(outcome("Fixed the typo.\n"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["stopReason"], "completed");
        assert_eq!(json["summary"], "Fixed the typo.");
        assert_eq!(json["usage"]["output"], 4);
        for absent in ["error", "diagnostics", "workspace", "patches", "changes", "automation", "githubAutomation"] {
            assert!(json.get(absent).is_none(), "{absent} should be absent");
        }
    }

    #[test]
    fn turns_are_user_then_assistant() {
        let result = compose(outcome("done"));
        assert_eq!(result.new_messages.len(), 2);
        assert_eq!(result.new_messages[0].role, Role::User);
        assert_eq!(result.new_messages[0].content, "fix typo");
        assert_eq!(result.new_messages[1].role, Role::Assistant);
        assert_eq!(result.new_messages[1].content, "done");
        assert_eq!(
            result.new_messages[1].metadata.as_ref().unwrap()["operationId"],
            "op_1"
        );
    }

    #[test]
    fn cancelled_and_error_stop_reasons() {
        let mut o = outcome("");
        o.error = Some(ClassifiedError {
            code: ErrorCode::Cancelled,
            message: "cancelled".into(),
            retryable: false,
            retry_hint: None,
        });
        let result = compose(o);
        assert_eq!(result.stop_reason, StopReason::Cancelled);
        assert_eq!(result.new_messages[1].content, "[cancelled] cancelled");

        let mut o = outcome("");
        o.error = Some(ClassifiedError {
            code: ErrorCode::AuthError,
            message: "bad key".into(),
            retryable: false,
            retry_hint: None,
        });
        assert_eq!(compose(o).stop_reason, StopReason::Error);
    }

    #[test]
    fn legacy_summary_only_on_success() {
        let mut o = outcome("done");
        o.automation = Some(AutomationResult::skipped(
            "no repository could be resolved",
            AutomationDiagnostics::default(),
        ));
        let result = compose(o);
        assert!(result.automation.is_some());
        assert!(result.github_automation.is_none());

        let mut o = outcome("done");
        let mut automation = AutomationResult::skipped("x", AutomationDiagnostics::default());
        automation.status = AutomationStatus::Success;
        automation.skipped_reason = None;
        automation.branch = Some("shipwright/change-1".into());
        o.automation = Some(automation);
        let legacy = compose(o).github_automation.unwrap();
        assert!(legacy.branch_created);
    }
}
