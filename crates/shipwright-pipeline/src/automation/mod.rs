use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use shipwright_core::automation::{
    AutomationDiagnostics, AutomationIntent, AutomationMode, AutomationResult, AutomationStatus,
    CommitInfo, PullRequestInfo,
};
use shipwright_core::repository::RepositoryDescriptor;

use crate::credential::Credential;

pub mod branch;
pub mod local;
pub mod orchestrator;
pub mod resolve;

pub use local::GitCommitAutomation;
pub use orchestrator::{AutomationOrchestrator, AutomationRequest, Decision};

/// Who asked for the change and how its inputs were resolved.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditMetadata {
    pub session_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installation_id: Option<String>,
    pub operation_id: String,
    pub repository_source: String,
    pub credential_source: String,
}

/// Everything a provider needs to publish a change.
#[derive(Debug, Clone)]
pub struct AutomationContext {
    pub repository: RepositoryDescriptor,
    pub credential: Credential,
    pub workspace_path: PathBuf,
    /// First line of the prompt, at most 80 characters.
    pub title: String,
    pub body: String,
    /// Run summary, at most 4000 characters.
    pub summary: String,
    pub intent: AutomationIntent,
    pub commit_message: Option<String>,
    pub changed_files: Vec<String>,
    pub branch_prefix: String,
    pub started_at_ms: u64,
    pub audit: AuditMetadata,
}

impl AutomationContext {
    /// Commit message to use when none was synthesized.
    pub fn default_commit_message(&self) -> String {
        match &self.repository.issue {
            Some(issue) => format!("Resolve #{}: {}", issue.number, self.title),
            None => format!("Apply requested change: {}", self.title),
        }
    }

    pub fn branch_name(&self) -> String {
        branch::branch_name(
            &self.branch_prefix,
            self.repository.issue.as_ref().map(|i| i.number),
            &self.title,
            self.started_at_ms,
        )
    }
}

/// Trait for change publication. Implemented by `GitCommitAutomation` and
/// `MockAutomation` (tests).
///
/// An `Err` is turned into an `automation-execution-failed` result by the
/// orchestrator; it never reaches the caller.
#[async_trait::async_trait]
pub trait AutomationProvider: Send + Sync {
    async fn execute(&self, context: &AutomationContext) -> Result<AutomationResult>;
}

/// Mock automation provider (for testing). Succeeds with a branch, commit
/// and (in full mode) pull request, or fails with a fixed message.
#[derive(Default)]
pub struct MockAutomation {
    fail: Option<String>,
    contexts: std::sync::Mutex<Vec<AutomationContext>>,
}

impl MockAutomation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn contexts(&self) -> Vec<AutomationContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AutomationProvider for MockAutomation {
    async fn execute(&self, context: &AutomationContext) -> Result<AutomationResult> {
        self.contexts.lock().unwrap().push(context.clone());
        if let Some(message) = &self.fail {
            anyhow::bail!("{message}");
        }
        let branch = context.branch_name();
        let pull_request = (context.intent.mode == AutomationMode::Full).then(|| PullRequestInfo {
            number: 1,
            url: format!(
                "https://github.com/{}/pull/1",
                context.repository.full_name()
            ),
            branch: branch.clone(),
            draft: false,
        });
        Ok(AutomationResult {
            status: AutomationStatus::Success,
            branch: Some(branch),
            commit: Some(CommitInfo {
                sha: crate::git::MOCK_HEAD.to_string(),
                message: context
                    .commit_message
                    .clone()
                    .unwrap_or_else(|| context.default_commit_message()),
            }),
            issue: context.repository.issue.clone(),
            pull_request,
            skipped_reason: None,
            error: None,
            files_modified: context.changed_files.clone(),
            diagnostics: AutomationDiagnostics {
                attempts: 1,
                logs: vec!["mock: published change".into()],
                ..Default::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_core::repository::IssueRef;

    fn context() -> AutomationContext {
        AutomationContext {
            repository: RepositoryDescriptor::new("acme", "widgets"),
            credential: Credential::new("t", "explicit"),
            workspace_path: PathBuf::from("/tmp/ws"),
            title: "Fix login".into(),
            body: "Fix login\n\nplease".into(),
            summary: "done".into(),
            intent: AutomationIntent::default(),
            commit_message: None,
            changed_files: vec!["a.rs".into()],
            branch_prefix: "shipwright".into(),
            started_at_ms: 1000,
            audit: AuditMetadata::default(),
        }
    }

    #[test]
    fn default_commit_message_mentions_issue() {
        let mut ctx = context();
        assert_eq!(ctx.default_commit_message(), "Apply requested change: Fix login");
        ctx.repository.issue = Some(IssueRef {
            id: None,
            number: 12,
            url: None,
            title: None,
        });
        assert_eq!(ctx.default_commit_message(), "Resolve #12: Fix login");
        assert_eq!(ctx.branch_name(), "shipwright/issue-12-1000");
    }

    #[tokio::test]
    async fn mock_success_opens_pr_in_full_mode() {
        let mock = MockAutomation::new();
        let result = mock.execute(&context()).await.unwrap();
        assert_eq!(result.status, AutomationStatus::Success);
        assert_eq!(result.branch.as_deref(), Some("shipwright/fix-login-1000"));
        assert!(result.pull_request.is_some());
        assert_eq!(mock.contexts().len(), 1);
    }

    #[tokio::test]
    async fn mock_failure() {
        let mock = MockAutomation::failing("push rejected");
        let err = mock.execute(&context()).await.unwrap_err();
        assert_eq!(err.to_string(), "push rejected");
    }
}
