use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::repository::IssueRef;

/// How far automation may go for one turn.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AutomationMode {
    None,
    CommitOnly,
    #[default]
    Full,
}

impl AutomationMode {
    /// Lenient parse of caller-supplied mode strings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "none" | "off" | "disabled" => Some(AutomationMode::None),
            "commit" | "commit-only" => Some(AutomationMode::CommitOnly),
            "full" | "pr" | "pull-request" => Some(AutomationMode::Full),
            _ => None,
        }
    }
}

/// Caller-supplied hints describing whether and how automation should run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutomationIntent {
    #[serde(default)]
    pub mode: AutomationMode,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub repository_blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub force: bool,
    /// The merged automation hints as received.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub raw: Map<String, Value>,
}

impl AutomationIntent {
    /// Derive intent signals from merged automation hints.
    pub fn from_hints(hints: &Map<String, Value>) -> Self {
        let flag = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| hints.get(*k))
                .any(|v| v.as_bool() == Some(true) || v.as_str() == Some("true"))
        };
        let explicit_mode = hints
            .get("mode")
            .and_then(Value::as_str)
            .and_then(AutomationMode::parse);
        let enabled_false = hints.get("enabled").and_then(Value::as_bool) == Some(false);

        Self {
            mode: explicit_mode.unwrap_or_default(),
            disabled: flag(&["disabled"]) || enabled_false,
            repository_blocked: flag(&["repositoryBlocked", "repository_blocked"]),
            reason: hints
                .get("reason")
                .and_then(Value::as_str)
                .map(String::from),
            explicit: flag(&["explicit"]) || explicit_mode.is_some(),
            force: flag(&["force"]),
            raw: hints.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AutomationStatus {
    Success,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullRequestInfo {
    pub number: u64,
    pub url: String,
    pub branch: String,
    #[serde(default)]
    pub draft: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutomationError {
    pub code: String,
    pub message: String,
}

/// Audit trail attached to every automation result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutomationDiagnostics {
    pub duration_ms: u64,
    pub attempts: u32,
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutomationResult {
    pub status: AutomationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<IssueRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AutomationError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_modified: Vec<String>,
    pub diagnostics: AutomationDiagnostics,
}

impl AutomationResult {
    pub fn skipped(reason: impl Into<String>, diagnostics: AutomationDiagnostics) -> Self {
        Self {
            status: AutomationStatus::Skipped,
            branch: None,
            commit: None,
            issue: None,
            pull_request: None,
            skipped_reason: Some(reason.into()),
            error: None,
            files_modified: Vec::new(),
            diagnostics,
        }
    }

    pub fn failed(
        code: impl Into<String>,
        message: impl Into<String>,
        diagnostics: AutomationDiagnostics,
    ) -> Self {
        Self {
            status: AutomationStatus::Error,
            branch: None,
            commit: None,
            issue: None,
            pull_request: None,
            skipped_reason: None,
            error: Some(AutomationError {
                code: code.into(),
                message: message.into(),
            }),
            files_modified: Vec::new(),
            diagnostics,
        }
    }

    /// Summary shape older callers still read.
    pub fn legacy_summary(&self) -> LegacyAutomationSummary {
        LegacyAutomationSummary {
            branch_created: self.branch.is_some(),
            pull_request_created: self.pull_request.is_some(),
            files_modified: self.files_modified.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyAutomationSummary {
    pub branch_created: bool,
    pub pull_request_created: bool,
    pub files_modified: Vec<String>,
}
