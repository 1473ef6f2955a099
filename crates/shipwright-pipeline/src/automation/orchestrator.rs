use std::path::Path;

use secrecy::SecretString;
use shipwright_core::automation::{
    AutomationDiagnostics, AutomationIntent, AutomationMode, AutomationResult, AutomationStatus,
};
use shipwright_core::context::AgentContext;
use shipwright_core::repository::RepositoryDescriptor;
use shipwright_core::session::Session;
use shipwright_core::format_rfc3339;
use time::OffsetDateTime;

use crate::automation::resolve::{resolve_credential, CredentialSources, Resolved};
use crate::automation::{AuditMetadata, AutomationContext, AutomationProvider};
use crate::clock::{elapsed_ms, Clock};
use crate::config::PipelineConfig;
use crate::redact::{mask_secrets, truncate_chars};
use crate::state::AutomationPhase;

const TITLE_LIMIT: usize = 80;
const SUMMARY_LIMIT: usize = 4000;

pub const EXECUTION_FAILED: &str = "automation-execution-failed";

/// Inputs gathered by the pipeline before deciding on automation.
#[derive(Debug, Clone, Copy)]
pub struct AutomationRequest<'a> {
    pub session: &'a Session,
    pub context: &'a AgentContext,
    pub explicit_token: Option<&'a SecretString>,
    pub repository: Option<&'a Resolved<RepositoryDescriptor>>,
    pub repo_ensured: bool,
    pub workspace_path: Option<&'a Path>,
    pub prompt: &'a str,
    pub summary: &'a str,
    pub changed_files: &'a [String],
    pub operation_id: &'a str,
}

/// A context ready for the provider, plus what resolution logged.
#[derive(Debug)]
pub struct ExecutionPlan {
    pub context: AutomationContext,
    logs: Vec<String>,
    phase: AutomationPhase,
    started_at: OffsetDateTime,
}

#[derive(Debug)]
pub enum Decision {
    Skip(AutomationResult),
    Execute(Box<ExecutionPlan>),
}

/// Decides whether a change may be published and runs the provider.
pub struct AutomationOrchestrator<'a> {
    provider: Option<&'a dyn AutomationProvider>,
    config: &'a PipelineConfig,
    clock: &'a dyn Clock,
}

/// First non-empty line, bounded.
pub fn prompt_title(prompt: &str) -> String {
    let line = prompt
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("Requested change");
    truncate_chars(line, TITLE_LIMIT)
}

fn enter(phase: &mut AutomationPhase, to: AutomationPhase) {
    if let Err(e) = phase.advance(to) {
        tracing::warn!(error = %e, "automation state");
    }
}

impl<'a> AutomationOrchestrator<'a> {
    pub fn new(
        provider: Option<&'a dyn AutomationProvider>,
        config: &'a PipelineConfig,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            provider,
            config,
            clock,
        }
    }

    fn skip(
        &self,
        mut phase: AutomationPhase,
        mut logs: Vec<String>,
        started_at: OffsetDateTime,
        reason: &str,
    ) -> Decision {
        enter(&mut phase, AutomationPhase::Skipped);
        logs.push(format!("automation skipped: {reason}"));
        tracing::info!(reason, "automation skipped");
        Decision::Skip(AutomationResult::skipped(
            reason,
            AutomationDiagnostics {
                duration_ms: elapsed_ms(self.clock, started_at),
                attempts: 0,
                logs,
                started_at: Some(format_rfc3339(started_at)),
                finished_at: Some(self.clock.now_rfc3339()),
            },
        ))
    }

    /// Run every guard in order. The first failing guard decides the skip
    /// reason.
    pub fn resolve(&self, req: &AutomationRequest<'_>) -> Decision {
        let started_at = self.clock.now();
        let mut phase = AutomationPhase::NotAttempted;
        enter(&mut phase, AutomationPhase::Resolving);
        let mut logs = Vec::new();

        if self.provider.is_none() {
            return self.skip(phase, logs, started_at, "automation provider not configured");
        }
        if self.config.automation_kill_switch {
            return self.skip(phase, logs, started_at, "automation disabled by configuration");
        }
        if req.session.automation_disabled() {
            return self.skip(phase, logs, started_at, "automation disabled for this session");
        }

        let intent = AutomationIntent::from_hints(&req.context.automation);
        if intent.disabled {
            let reason = intent
                .reason
                .clone()
                .unwrap_or_else(|| "automation disabled by request".to_string());
            return self.skip(phase, logs, started_at, &reason);
        }
        if intent.mode == AutomationMode::None {
            return self.skip(phase, logs, started_at, "automation mode is none");
        }
        if intent.repository_blocked {
            return self.skip(phase, logs, started_at, "repository is blocked for automation");
        }

        let credential = resolve_credential(&CredentialSources {
            explicit: req.explicit_token,
            context: req.context,
            ambient: self.config.ambient_credential.as_ref(),
        });
        let Some(credential) = credential else {
            if let Some(installation) = req.context.installation_id_text() {
                tracing::warn!(
                    installation_id = %installation,
                    "installation id present but no hosting token was supplied"
                );
                logs.push(format!(
                    "configuration warning: installation {installation} has no token"
                ));
            }
            return self.skip(phase, logs, started_at, "no hosting credential available");
        };
        logs.push(format!("credential resolved from {}", credential.source));

        let Some(repository) = req.repository else {
            return self.skip(phase, logs, started_at, "no repository could be resolved");
        };
        logs.push(format!(
            "repository {} resolved from {}",
            repository.value.full_name(),
            repository.source
        ));

        let workspace_path = match req.workspace_path {
            Some(p) if req.repo_ensured => p.to_path_buf(),
            _ => {
                return self.skip(phase, logs, started_at, "repository checkout is not available")
            }
        };
        if req.changed_files.is_empty() && !repository.value.allow_empty_commit {
            return self.skip(phase, logs, started_at, "no file changes to publish");
        }

        enter(&mut phase, AutomationPhase::Executing);
        let context = AutomationContext {
            repository: repository.value.clone(),
            credential: credential.value,
            workspace_path,
            title: prompt_title(req.prompt),
            body: req.prompt.to_string(),
            summary: truncate_chars(req.summary, SUMMARY_LIMIT),
            intent,
            commit_message: None,
            changed_files: req.changed_files.to_vec(),
            branch_prefix: self.config.branch_prefix.clone(),
            started_at_ms: self.clock.unix_millis(),
            audit: AuditMetadata {
                session_mode: req.session.mode.as_str().to_string(),
                user_id: req.context.user_id.clone(),
                installation_id: req.context.installation_id_text(),
                operation_id: req.operation_id.to_string(),
                repository_source: repository.source.to_string(),
                credential_source: credential.source.to_string(),
            },
        };
        Decision::Execute(Box::new(ExecutionPlan {
            context,
            logs,
            phase,
            started_at,
        }))
    }

    /// Run the provider. Never fails: provider errors become an
    /// `automation-execution-failed` result.
    pub async fn execute(
        &self,
        plan: ExecutionPlan,
        commit_message: Option<String>,
    ) -> AutomationResult {
        let ExecutionPlan {
            mut context,
            mut logs,
            mut phase,
            started_at,
        } = plan;
        context.commit_message = commit_message;

        let outcome = match self.provider {
            Some(provider) => provider.execute(&context).await,
            None => Err(anyhow::anyhow!("automation provider not configured")),
        };

        let mut result = match outcome {
            Ok(mut result) => {
                logs.append(&mut result.diagnostics.logs);
                if result.status == AutomationStatus::Error {
                    enter(&mut phase, AutomationPhase::Failed);
                } else {
                    enter(&mut phase, AutomationPhase::Succeeded);
                }
                logs.push(format!(
                    "automation finished: {}",
                    serde_json::to_value(result.status)
                        .ok()
                        .and_then(|v| v.as_str().map(String::from))
                        .unwrap_or_default()
                ));
                result
            }
            Err(e) => {
                enter(&mut phase, AutomationPhase::Failed);
                let message = mask_secrets(&format!("{e:#}"));
                tracing::warn!(error = %message, "automation failed");
                logs.push(format!("automation failed: {message}"));
                AutomationResult::failed(EXECUTION_FAILED, message, AutomationDiagnostics::default())
            }
        };

        let elapsed = elapsed_ms(self.clock, started_at);
        result.diagnostics = AutomationDiagnostics {
            duration_ms: result.diagnostics.duration_ms.max(elapsed),
            attempts: result.diagnostics.attempts.max(1),
            logs,
            started_at: Some(format_rfc3339(started_at)),
            finished_at: Some(self.clock.now_rfc3339()),
        };
        tracing::info!(
            status = ?result.status,
            branch = result.branch.as_deref().unwrap_or(""),
            phase = ?phase,
            "automation done"
        );
        result
    }
}
