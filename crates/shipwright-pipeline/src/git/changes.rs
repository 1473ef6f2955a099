use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::git::GitService;
use crate::redact::{mask_secrets, truncate_chars};

const DIFF_EXCERPT_LIMIT: usize = 4000;

/// Git state of the workspace right before automation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSnapshot {
    pub changed_files: Vec<String>,
    pub has_uncommitted_changes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub diff_stat: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub diff_excerpt: String,
    /// Git errors hit while taking the snapshot.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub captured_at: String,
}

async fn capture(
    git: &dyn GitService,
    path: &Path,
    args: &[&str],
    errors: &mut Vec<String>,
) -> Option<String> {
    match git.run_git(path, args).await {
        Ok(out) if out.success() => Some(out.stdout.trim_end().to_string()),
        Ok(out) => {
            errors.push(format!(
                "git {}: {}",
                args.join(" "),
                mask_secrets(out.stderr.trim())
            ));
            None
        }
        Err(e) => {
            errors.push(format!("git {}: {e:#}", args.join(" ")));
            None
        }
    }
}

/// Snapshot changed files, branch, head and a diff excerpt. Never fails;
/// git errors are collected in [`ChangeSnapshot::errors`].
pub async fn detect_changes(git: &dyn GitService, path: &Path, clock: &dyn Clock) -> ChangeSnapshot {
    let mut errors = Vec::new();
    let changed_files = match git.list_changed_files(path).await {
        Ok(files) => files,
        Err(e) => {
            errors.push(format!("listing changes: {}", mask_secrets(&format!("{e:#}"))));
            Vec::new()
        }
    };
    let has_uncommitted_changes = !changed_files.is_empty()
        || (!errors.is_empty() && git.has_uncommitted_changes(path).await.unwrap_or(false));

    let branch = capture(git, path, &["rev-parse", "--abbrev-ref", "HEAD"], &mut errors)
        .await
        .filter(|b| !b.is_empty());
    let head = capture(git, path, &["rev-parse", "HEAD"], &mut errors)
        .await
        .filter(|h| !h.is_empty());

    let (diff_stat, diff_excerpt) = if changed_files.is_empty() {
        (String::new(), String::new())
    } else {
        let stat = capture(git, path, &["diff", "--stat", "HEAD"], &mut errors)
            .await
            .unwrap_or_default();
        let diff = capture(git, path, &["diff", "HEAD"], &mut errors)
            .await
            .unwrap_or_default();
        (stat, truncate_chars(&diff, DIFF_EXCERPT_LIMIT))
    };

    ChangeSnapshot {
        changed_files,
        has_uncommitted_changes,
        branch,
        head,
        diff_stat,
        diff_excerpt,
        errors,
        captured_at: clock.now_rfc3339(),
    }
}
