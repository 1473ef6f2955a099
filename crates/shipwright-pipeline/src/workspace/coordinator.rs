use std::path::Path;

use serde_json::{Map, Value};
use shipwright_core::context::AgentContext;
use shipwright_core::repository::{RepositoryDescriptor, WorkspaceDescriptor};
use shipwright_core::session::Session;

use crate::automation::resolve::{resolve_repository, RepoSources, Resolved};
use crate::config::PipelineConfig;
use crate::credential::{authenticated_url, Credential};
use crate::git::{EnsureRepo, GitService};
use crate::redact::mask_secrets;
use crate::workspace::{PrepareRequest, WorkspaceService};

/// Inputs for workspace coordination.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateRequest<'a> {
    pub session: &'a Session,
    pub context: &'a AgentContext,
    pub request_fields: &'a Map<String, Value>,
    /// Used only in clone and fetch arguments.
    pub credential: Option<&'a Credential>,
    pub reuse: bool,
}

/// Where the model will run and what repository it is working on.
#[derive(Debug, Clone, Default)]
pub struct WorkspacePlan {
    pub workspace: Option<WorkspaceDescriptor>,
    pub repository: Option<Resolved<RepositoryDescriptor>>,
    /// False means conversation-only mode: nothing may be published.
    pub repo_ensured: bool,
    pub logs: Vec<String>,
}

impl WorkspacePlan {
    fn note(&mut self, line: String) {
        let line = mask_secrets(&line);
        tracing::debug!("{line}");
        self.logs.push(line);
    }

    fn warn(&mut self, line: String) {
        let line = mask_secrets(&line);
        tracing::warn!("{line}");
        self.logs.push(line);
    }
}

fn with_credential(url: &str, credential: Option<&Credential>) -> String {
    match credential {
        Some(c) => authenticated_url(url, c),
        None => url.to_string(),
    }
}

/// Prepare the workspace, make sure the repository is checked out and put
/// it on the target branch.
///
/// Never fails. Every problem is logged and leaves `repo_ensured` false or
/// the branch where it was.
pub async fn coordinate(
    workspaces: &dyn WorkspaceService,
    git: &dyn GitService,
    config: &PipelineConfig,
    req: &CoordinateRequest<'_>,
) -> WorkspacePlan {
    let mut plan = WorkspacePlan::default();
    let mut sources = RepoSources {
        context: req.context,
        request_fields: req.request_fields,
        workspace: None,
    };
    plan.repository = resolve_repository(&sources);

    let prepared = workspaces
        .prepare(&PrepareRequest {
            session_id: req.session.id.clone(),
            reuse: req.reuse,
            workspace_uri: req.session.workspace_uri.clone(),
            session_options: req.session.options.clone(),
        })
        .await;
    let workspace = match prepared {
        Ok(w) => w,
        Err(e) => {
            plan.warn(format!("workspace preparation failed: {e:#}"));
            return plan;
        }
    };
    plan.note(format!("workspace at {}", workspace.path.display()));

    if plan.repository.is_none() {
        sources.workspace = Some(&workspace);
        plan.repository = resolve_repository(&sources);
    }

    let Some(mut repository) = plan.repository.take() else {
        plan.repo_ensured = workspace.git.is_some();
        plan.note("no repository resolved; using workspace as is".into());
        plan.workspace = Some(workspace);
        return plan;
    };

    let descriptor = &mut repository.value;
    let clone_url = descriptor
        .clone_url
        .get_or_insert_with(|| {
            format!(
                "https://{}/{}/{}.git",
                config.git_host, descriptor.owner, descriptor.name
            )
        })
        .clone();
    plan.note(format!(
        "repository {} from {}",
        descriptor.full_name(),
        repository.source
    ));

    let ensure = EnsureRepo {
        default_branch: descriptor.default_branch.clone(),
        clone_url: Some(with_credential(&clone_url, req.credential)),
    };
    match git.ensure_repo(&workspace.path, &ensure).await {
        Ok(()) => {
            plan.repo_ensured = true;
            let remote = with_credential(&clone_url, req.credential);
            sync_branch(git, &workspace.path, &remote, &repository.value, &mut plan).await;
        }
        Err(e) => plan.warn(format!("ensuring repository failed: {e:#}")),
    }

    plan.repository = Some(repository);
    plan.workspace = Some(workspace);
    plan
}

async fn git_ok(git: &dyn GitService, path: &Path, args: &[&str], plan: &mut WorkspacePlan) -> bool {
    match git.run_git(path, args).await {
        Ok(out) if out.success() => true,
        Ok(out) => {
            plan.note(format!(
                "git {} exited {}: {}",
                args.first().copied().unwrap_or(""),
                out.exit_code,
                out.stderr.trim()
            ));
            false
        }
        Err(e) => {
            plan.warn(format!("git {} failed: {e:#}", args.first().copied().unwrap_or("")));
            false
        }
    }
}

/// Fetch the target branch by explicit refspec, then check it out:
/// rebased onto the remote when it exists there, as-is when only local,
/// freshly created from the default branch otherwise.
async fn sync_branch(
    git: &dyn GitService,
    path: &Path,
    remote: &str,
    repository: &RepositoryDescriptor,
    plan: &mut WorkspacePlan,
) {
    let branch = repository.target_branch();
    let default = repository.default_branch.as_str();
    let refspec = format!("+refs/heads/{branch}:refs/remotes/origin/{branch}");
    let remote_exists = git_ok(git, path, &["fetch", remote, &refspec], plan).await;
    let local_ref = format!("refs/heads/{branch}");
    let local_exists =
        git_ok(git, path, &["rev-parse", "--verify", "--quiet", &local_ref], plan).await;
    let upstream = format!("origin/{branch}");

    if remote_exists {
        let checked_out = if local_exists {
            git_ok(git, path, &["checkout", branch], plan).await
        } else {
            git_ok(git, path, &["checkout", "-b", branch, "--track", &upstream], plan).await
        };
        if !checked_out {
            plan.warn(format!("could not check out {branch}"));
            return;
        }
        if !git_ok(git, path, &["rebase", &upstream], plan).await {
            git_ok(git, path, &["rebase", "--abort"], plan).await;
            plan.warn(format!("rebase of {branch} onto {upstream} failed; kept local state"));
            return;
        }
        plan.note(format!("on {branch}, rebased onto {upstream}"));
    } else if local_exists {
        if git_ok(git, path, &["checkout", branch], plan).await {
            plan.note(format!("on local branch {branch}"));
        } else {
            plan.warn(format!("could not check out {branch}"));
        }
    } else {
        if branch != default {
            let default_spec = format!("+refs/heads/{default}:refs/remotes/origin/{default}");
            git_ok(git, path, &["fetch", remote, &default_spec], plan).await;
        }
        let start = format!("origin/{default}");
        if git_ok(git, path, &["checkout", "-b", branch, &start], plan).await
            || git_ok(git, path, &["checkout", "-b", branch], plan).await
        {
            plan.note(format!("created {branch} from {default}"));
        } else {
            plan.warn(format!("could not create {branch}"));
        }
    }
}
