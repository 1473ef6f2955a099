use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use shipwright_core::repository::{GitSnapshot, WorkspaceDescriptor};
use shipwright_core::session::SessionOptions;

use crate::clock::{Clock, SystemClock};
use crate::git::GitCli;

pub mod coordinator;

pub use coordinator::{coordinate, CoordinateRequest, WorkspacePlan};

/// Request for a working directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepareRequest {
    pub session_id: String,
    /// Reuse the session's persistent directory instead of a fresh one.
    pub reuse: bool,
    /// Caller-pinned location (`file://` URI or plain path).
    pub workspace_uri: Option<String>,
    /// Options of the owning session. `LocalWorkspaces` does not read them.
    pub session_options: SessionOptions,
}

/// Trait for workspace provisioning. Implemented by `LocalWorkspaces` and
/// `MemoryWorkspaces` (tests).
#[async_trait::async_trait]
pub trait WorkspaceService: Send + Sync {
    async fn prepare(&self, request: &PrepareRequest) -> Result<WorkspaceDescriptor>;
}

/// Path named by a workspace URI.
pub fn uri_to_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
}

/// Directories under `{root}/workspaces/`.
pub struct LocalWorkspaces {
    root: PathBuf,
    git: GitCli,
    clock: Arc<dyn Clock>,
}

impl LocalWorkspaces {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            git: GitCli::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn location(&self, request: &PrepareRequest) -> (PathBuf, bool) {
        if let Some(uri) = request.workspace_uri.as_deref().filter(|u| !u.trim().is_empty()) {
            return (uri_to_path(uri.trim()), false);
        }
        if request.reuse {
            return (
                shipwright_store::workspace_dir(&self.root, &request.session_id),
                false,
            );
        }
        let name = format!("tmp-{}", ulid::Ulid::new().to_string().to_lowercase());
        (self.root.join("workspaces").join(name), true)
    }

    async fn snapshot(&self, path: &Path) -> Option<GitSnapshot> {
        if path.join(".git").exists() {
            Some(self.git.snapshot(path).await)
        } else {
            None
        }
    }
}

#[async_trait::async_trait]
impl WorkspaceService for LocalWorkspaces {
    async fn prepare(&self, request: &PrepareRequest) -> Result<WorkspaceDescriptor> {
        let (path, ephemeral) = self.location(request);
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("creating workspace {}", path.display()))?;
        let git = self.snapshot(&path).await;
        tracing::debug!(
            session_id = %request.session_id,
            path = %path.display(),
            ephemeral,
            "workspace prepared"
        );
        Ok(WorkspaceDescriptor {
            session_id: request.session_id.clone(),
            path,
            ephemeral,
            created_at: self.clock.now_rfc3339(),
            git,
        })
    }
}

/// Workspace service that hands out fixed descriptors (for testing).
#[derive(Default)]
pub struct MemoryWorkspaces {
    base: PathBuf,
    git: Option<GitSnapshot>,
    fail: Option<String>,
    requests: std::sync::Mutex<Vec<PrepareRequest>>,
}

impl MemoryWorkspaces {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            ..Default::default()
        }
    }

    /// Report an existing checkout with this remote.
    pub fn with_remote(mut self, remote_url: &str) -> Self {
        self.git = Some(GitSnapshot {
            branch: Some("main".into()),
            remote_url: Some(remote_url.to_string()),
            ..Default::default()
        });
        self
    }

    pub fn with_checkout(mut self) -> Self {
        self.git.get_or_insert_with(|| GitSnapshot {
            branch: Some("main".into()),
            ..Default::default()
        });
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail = Some(message.to_string());
        self
    }

    pub fn requests(&self) -> Vec<PrepareRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl WorkspaceService for MemoryWorkspaces {
    async fn prepare(&self, request: &PrepareRequest) -> Result<WorkspaceDescriptor> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(message) = &self.fail {
            anyhow::bail!("{message}");
        }
        Ok(WorkspaceDescriptor {
            session_id: request.session_id.clone(),
            path: self.base.join(&request.session_id),
            ephemeral: !request.reuse,
            created_at: "2026-01-01T00:00:00Z".into(),
            git: self.git.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    #[test]
    fn file_uri_to_path() {
        assert_eq!(uri_to_path("file:///tmp/ws"), PathBuf::from("/tmp/ws"));
        assert_eq!(uri_to_path("/tmp/ws"), PathBuf::from("/tmp/ws"));
    }

    #[tokio::test]
    async fn reusable_workspace_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspaces::new(dir.path()).with_clock(Arc::new(FixedClock::at_epoch_2026()));
        let req = PrepareRequest {
            session_id: "s1".into(),
            reuse: true,
            ..Default::default()
        };
        let a = ws.prepare(&req).await.unwrap();
        let b = ws.prepare(&req).await.unwrap();
        assert_eq!(a.path, b.path);
        assert!(!a.ephemeral);
        assert!(a.path.is_dir());
        assert!(a.git.is_none());
        assert_eq!(a.created_at, "2026-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn ephemeral_workspaces_differ() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspaces::new(dir.path());
        let req = PrepareRequest {
            session_id: "s1".into(),
            ..Default::default()
        };
        let a = ws.prepare(&req).await.unwrap();
        let b = ws.prepare(&req).await.unwrap();
        assert_ne!(a.path, b.path);
        assert!(a.ephemeral);
        assert!(a.path.file_name().unwrap().to_string_lossy().starts_with("tmp-"));
    }

    #[tokio::test]
    async fn pinned_uri_wins() {
        let dir = tempfile::tempdir().unwrap();
        let pinned = dir.path().join("pinned");
        let ws = LocalWorkspaces::new(dir.path().join("root"));
        let desc = ws
            .prepare(&PrepareRequest {
                session_id: "s1".into(),
                reuse: true,
                workspace_uri: Some(format!("file://{}", pinned.display())),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(desc.path, pinned);
        assert!(pinned.is_dir());
    }
}
