use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

pub mod changes;
pub mod cli;
pub mod patch;

pub use changes::{detect_changes, ChangeSnapshot};
pub use cli::GitCli;

use crate::redact::mask_secrets;

/// Request to make sure `path` is a checkout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnsureRepo {
    pub default_branch: String,
    /// May carry a credential; never persisted as the remote URL.
    pub clone_url: Option<String>,
}

/// Captured output of one git invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl GitOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code,
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait for git access. Implemented by `GitCli` and `MockGit` (tests).
///
/// `run_git` only errors when git cannot be run at all; a non-zero exit is
/// reported through [`GitOutput::exit_code`].
#[async_trait::async_trait]
pub trait GitService: Send + Sync {
    async fn ensure_repo(&self, path: &Path, request: &EnsureRepo) -> Result<()>;
    async fn run_git(&self, path: &Path, args: &[&str]) -> Result<GitOutput>;
    async fn list_changed_files(&self, path: &Path) -> Result<Vec<String>>;
    async fn has_uncommitted_changes(&self, path: &Path) -> Result<bool>;
    async fn apply_patch(&self, path: &Path, patch: &str) -> Result<()>;
}

/// Run git and fail on a non-zero exit, with masked stderr in the error.
pub async fn run_checked(git: &dyn GitService, path: &Path, args: &[&str]) -> Result<String> {
    let out = git.run_git(path, args).await?;
    if !out.success() {
        bail!(
            "git {} failed (exit {}): {}",
            args.first().copied().unwrap_or(""),
            out.exit_code,
            mask_secrets(out.stderr.trim())
        );
    }
    Ok(out.stdout)
}

/// Paths from `git status --porcelain` output.
pub fn parse_porcelain(stdout: &str) -> Vec<String> {
    let mut files: Vec<String> = stdout
        .lines()
        .filter(|l| l.len() > 3)
        .map(|l| {
            let path = &l[3..];
            // Renames are reported as "old -> new".
            let path = path.rsplit_once(" -> ").map_or(path, |(_, new)| new);
            path.trim().trim_matches('"').to_string()
        })
        .filter(|p| !p.is_empty())
        .collect();
    files.sort();
    files.dedup();
    files
}

#[derive(Default)]
struct MockGitState {
    commands: Vec<String>,
    changed_files: Vec<String>,
    remote_branches: Vec<String>,
    local_branches: Vec<String>,
    current_branch: Option<String>,
    remote_url: Option<String>,
    ensure_error: Option<String>,
    failing: Vec<String>,
    ensured: Vec<(PathBuf, EnsureRepo)>,
    applied: Vec<String>,
}

/// In-memory git for tests. Simulates the subset of commands the pipeline
/// issues and records every invocation.
#[derive(Default)]
pub struct MockGit {
    state: std::sync::Mutex<MockGitState>,
}

/// Patches containing this marker fail to apply in [`MockGit`].
pub const MOCK_BAD_PATCH: &str = "MOCK-BAD-PATCH";

pub const MOCK_HEAD: &str = "0123456789abcdef0123456789abcdef01234567";

impl MockGit {
    pub fn new() -> Self {
        let git = Self::default();
        {
            let mut s = git.state.lock().unwrap();
            s.local_branches.push("main".into());
            s.current_branch = Some("main".into());
        }
        git
    }

    pub fn with_changed_files(self, files: &[&str]) -> Self {
        self.state.lock().unwrap().changed_files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_remote_branches(self, branches: &[&str]) -> Self {
        self.state.lock().unwrap().remote_branches =
            branches.iter().map(|b| b.to_string()).collect();
        self
    }

    pub fn with_local_branches(self, branches: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .local_branches
            .extend(branches.iter().map(|b| b.to_string()));
        self
    }

    pub fn with_remote_url(self, url: &str) -> Self {
        self.state.lock().unwrap().remote_url = Some(url.to_string());
        self
    }

    pub fn with_ensure_error(self, message: &str) -> Self {
        self.state.lock().unwrap().ensure_error = Some(message.to_string());
        self
    }

    /// Make every command whose first argument is `subcommand` exit 1.
    pub fn failing(self, subcommand: &str) -> Self {
        self.state.lock().unwrap().failing.push(subcommand.to_string());
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn ensured(&self) -> Vec<(PathBuf, EnsureRepo)> {
        self.state.lock().unwrap().ensured.clone()
    }

    pub fn applied_patches(&self) -> Vec<String> {
        self.state.lock().unwrap().applied.clone()
    }

    pub fn current_branch(&self) -> Option<String> {
        self.state.lock().unwrap().current_branch.clone()
    }
}

#[async_trait::async_trait]
impl GitService for MockGit {
    async fn ensure_repo(&self, path: &Path, request: &EnsureRepo) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.ensured.push((path.to_path_buf(), request.clone()));
        if let Some(e) = &s.ensure_error {
            bail!("{e}");
        }
        Ok(())
    }

    async fn run_git(&self, _path: &Path, args: &[&str]) -> Result<GitOutput> {
        let mut s = self.state.lock().unwrap();
        s.commands.push(args.join(" "));
        // Leading `-c key=value` pairs are per-invocation config.
        let mut args = args;
        while let ["-c", _, rest @ ..] = args {
            args = rest;
        }
        let sub = args.first().copied().unwrap_or("");
        if s.failing.iter().any(|f| f == sub) {
            return Ok(GitOutput::failed(1, format!("mock: {sub} failed")));
        }
        let out = match args {
            ["fetch", .., refspec] if refspec.starts_with("+refs/heads/") => {
                let branch = refspec
                    .trim_start_matches("+refs/heads/")
                    .split(':')
                    .next()
                    .unwrap_or("");
                if s.remote_branches.iter().any(|b| b == branch) {
                    GitOutput::ok("")
                } else {
                    GitOutput::failed(128, format!("fatal: couldn't find remote ref {branch}"))
                }
            }
            ["rev-parse", "--verify", "--quiet", reference] => {
                let found = if let Some(b) = reference.strip_prefix("refs/remotes/origin/") {
                    s.remote_branches.iter().any(|r| r == b)
                } else if let Some(b) = reference.strip_prefix("refs/heads/") {
                    s.local_branches.iter().any(|r| r == b)
                } else {
                    false
                };
                if found {
                    GitOutput::ok(format!("{MOCK_HEAD}\n"))
                } else {
                    GitOutput::failed(1, "")
                }
            }
            ["rev-parse", "--abbrev-ref", "HEAD"] => {
                GitOutput::ok(format!("{}\n", s.current_branch.clone().unwrap_or_default()))
            }
            ["rev-parse", "HEAD"] => GitOutput::ok(format!("{MOCK_HEAD}\n")),
            ["checkout", "-b", branch, ..] => {
                let branch = branch.to_string();
                if !s.local_branches.contains(&branch) {
                    s.local_branches.push(branch.clone());
                }
                s.current_branch = Some(branch);
                GitOutput::ok("")
            }
            ["checkout", branch] => {
                if s.local_branches.iter().any(|b| b == branch) {
                    s.current_branch = Some(branch.to_string());
                    GitOutput::ok("")
                } else {
                    GitOutput::failed(1, format!("error: pathspec '{branch}' did not match"))
                }
            }
            ["status", "--porcelain", ..] => GitOutput::ok(
                s.changed_files
                    .iter()
                    .map(|f| format!(" M {f}\n"))
                    .collect::<String>(),
            ),
            ["diff", "--stat", ..] if !s.changed_files.is_empty() => GitOutput::ok(format!(
                " {} files changed\n",
                s.changed_files.len()
            )),
            ["diff", ..] => GitOutput::ok(
                s.changed_files
                    .iter()
                    .map(|f| format!("diff --git a/{f} b/{f}\n"))
                    .collect::<String>(),
            ),
            ["remote", "get-url", "origin"] => match &s.remote_url {
                Some(url) => GitOutput::ok(format!("{url}\n")),
                None => GitOutput::failed(2, "error: No such remote 'origin'"),
            },
            ["commit", rest @ ..] => {
                if s.changed_files.is_empty() && !rest.contains(&"--allow-empty") {
                    GitOutput::failed(1, "nothing to commit, working tree clean")
                } else {
                    GitOutput::ok("")
                }
            }
            _ => GitOutput::ok(""),
        };
        Ok(out)
    }

    async fn list_changed_files(&self, _path: &Path) -> Result<Vec<String>> {
        let mut files = self.state.lock().unwrap().changed_files.clone();
        files.sort();
        Ok(files)
    }

    async fn has_uncommitted_changes(&self, _path: &Path) -> Result<bool> {
        Ok(!self.state.lock().unwrap().changed_files.is_empty())
    }

    async fn apply_patch(&self, _path: &Path, patch: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if patch.contains(MOCK_BAD_PATCH) {
            bail!("error: patch failed: corrupt patch");
        }
        s.applied.push(patch.to_string());
        for line in patch.lines() {
            if let Some(path) = line.strip_prefix("+++ b/") {
                let path = path.trim().to_string();
                if !s.changed_files.contains(&path) {
                    s.changed_files.push(path);
                }
            }
        }
        Ok(())
    }
}
