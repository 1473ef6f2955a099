use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use shipwright_core::repository::GitSnapshot;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::credential::strip_credentials;
use crate::git::{parse_porcelain, EnsureRepo, GitOutput, GitService};
use crate::redact::mask_secrets;

/// `GitService` backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    pub git_bin: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            git_bin: "git".into(),
        }
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(&self, cwd: &Path) -> Command {
        let mut cmd = Command::new(&self.git_bin);
        cmd.current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn output(&self, cwd: &Path, args: &[&str]) -> Result<GitOutput> {
        let output = self
            .command(cwd)
            .args(args)
            .output()
            .await
            .with_context(|| format!("running git {}", args.first().copied().unwrap_or("")))?;
        Ok(GitOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: mask_secrets(&String::from_utf8_lossy(&output.stderr)),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Branch, remote, dirty flag and last commit of a checkout.
    pub async fn snapshot(&self, path: &Path) -> GitSnapshot {
        let text = |out: Result<GitOutput>| {
            out.ok()
                .filter(GitOutput::success)
                .map(|o| o.stdout.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        GitSnapshot {
            branch: text(self.output(path, &["rev-parse", "--abbrev-ref", "HEAD"]).await),
            remote_url: text(self.output(path, &["remote", "get-url", "origin"]).await)
                .map(|u| strip_credentials(&u)),
            dirty: self.has_uncommitted_changes(path).await.unwrap_or(false),
            last_commit: text(self.output(path, &["log", "-1", "--format=%h %s"]).await),
        }
    }
}

#[async_trait::async_trait]
impl GitService for GitCli {
    async fn ensure_repo(&self, path: &Path, request: &EnsureRepo) -> Result<()> {
        if path.join(".git").exists() {
            return Ok(());
        }
        let Some(url) = request.clone_url.as_deref() else {
            bail!("{} is not a git checkout and no clone URL is known", path.display());
        };
        let parent = path.parent().unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
        // An empty directory is fine for clone; anything else is not ours to touch.
        if path.exists() {
            let mut entries = tokio::fs::read_dir(path).await?;
            if entries.next_entry().await?.is_some() {
                bail!("{} exists, is not empty and is not a checkout", path.display());
            }
        }
        let target = path.to_string_lossy().into_owned();

        let shallow = self
            .output(
                parent,
                &[
                    "clone",
                    "--depth",
                    "1",
                    "--no-single-branch",
                    "--branch",
                    &request.default_branch,
                    url,
                    &target,
                ],
            )
            .await?;
        if !shallow.success() {
            tracing::debug!(stderr = %shallow.stderr.trim(), "shallow clone failed, retrying full clone");
            let _ = tokio::fs::remove_dir_all(path).await;
            let full = self.output(parent, &["clone", url, &target]).await?;
            if !full.success() {
                bail!("git clone failed (exit {}): {}", full.exit_code, full.stderr.trim());
            }
        }

        // Keep the token out of .git/config.
        let clean = strip_credentials(url);
        let reset = self
            .output(path, &["remote", "set-url", "origin", &clean])
            .await?;
        if !reset.success() {
            bail!("resetting origin URL failed: {}", reset.stderr.trim());
        }
        tracing::info!(path = %path.display(), remote = %clean, "cloned repository");
        Ok(())
    }

    async fn run_git(&self, path: &Path, args: &[&str]) -> Result<GitOutput> {
        self.output(path, args).await
    }

    async fn list_changed_files(&self, path: &Path) -> Result<Vec<String>> {
        let out = self.output(path, &["status", "--porcelain", "-uall"]).await?;
        if !out.success() {
            bail!("git status failed: {}", out.stderr.trim());
        }
        Ok(parse_porcelain(&out.stdout))
    }

    async fn has_uncommitted_changes(&self, path: &Path) -> Result<bool> {
        Ok(!self.list_changed_files(path).await?.is_empty())
    }

    async fn apply_patch(&self, path: &Path, patch: &str) -> Result<()> {
        let mut child = self
            .command(path)
            .args(["apply", "--whitespace=nowarn", "-"])
            .stdin(Stdio::piped())
            .spawn()
            .context("running git apply")?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(patch.as_bytes()).await?;
            if !patch.ends_with('\n') {
                stdin.write_all(b"\n").await?;
            }
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            bail!(
                "git apply failed: {}",
                mask_secrets(String::from_utf8_lossy(&output.stderr).trim())
            );
        }
        Ok(())
    }
}
