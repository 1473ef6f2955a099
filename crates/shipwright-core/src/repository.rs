use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Git state of a workspace at the time it was prepared.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub dirty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
}

/// A directory dedicated to one session's working copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDescriptor {
    pub session_id: String,
    pub path: PathBuf,
    pub ephemeral: bool,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

/// Reference to a hosted issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

pub const DEFAULT_BRANCH: &str = "main";

/// Everything the pipeline knows about the target repository.
///
/// `clone_url` never carries credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryDescriptor {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_url: Option<String>,
    /// Working branch override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Base branch override for pull requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<IssueRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_identity: Option<GitIdentity>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub allow_empty_commit: bool,
}

impl RepositoryDescriptor {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            default_branch: DEFAULT_BRANCH.to_string(),
            clone_url: None,
            branch: None,
            base: None,
            issue: None,
            labels: Vec::new(),
            git_identity: None,
            dry_run: false,
            allow_empty_commit: false,
        }
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Branch the workspace should be on before the model runs.
    pub fn target_branch(&self) -> &str {
        self.branch.as_deref().unwrap_or(&self.default_branch)
    }

    /// Branch pull requests should target.
    pub fn base_branch(&self) -> &str {
        self.base.as_deref().unwrap_or(&self.default_branch)
    }
}

/// Owner/name pair parsed from a repository reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub owner: String,
    pub name: String,
    /// Normalized `https://host/owner/name.git` for URL inputs.
    pub clone_url: Option<String>,
}

impl RepoCoordinates {
    /// Parse `owner/name`, `https://host/owner/name(.git)` or
    /// `git@host:owner/name(.git)` / `ssh://git@host/owner/name(.git)`.
    /// Credentials embedded in URLs are dropped.
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim().trim_end_matches('/');
        if s.is_empty() {
            return None;
        }

        let (host, path) = if let Some(rest) = s
            .strip_prefix("https://")
            .or_else(|| s.strip_prefix("http://"))
            .or_else(|| s.strip_prefix("ssh://"))
        {
            let (authority, path) = rest.split_once('/')?;
            let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
            // ssh://git@host:22/owner/name
            let host = host.split_once(':').map_or(host, |(h, _)| h);
            (Some(host), path)
        } else if let Some((user_host, path)) = s.split_once(':') {
            // scp-like: git@host:owner/name
            let host = user_host.rsplit_once('@').map_or(user_host, |(_, h)| h);
            if host.is_empty() || host.contains('/') {
                return None;
            }
            (Some(host), path)
        } else {
            (None, s)
        };

        let mut parts = path.trim_matches('/').split('/');
        let owner = parts.next()?.trim();
        let name = parts.next()?.trim();
        let name = name.strip_suffix(".git").unwrap_or(name);
        if parts.next().is_some() && host.is_none() {
            return None;
        }
        if !is_segment(owner) || !is_segment(name) {
            return None;
        }

        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            clone_url: host.map(|h| format!("https://{h}/{owner}/{name}.git")),
        })
    }
}

fn is_segment(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
