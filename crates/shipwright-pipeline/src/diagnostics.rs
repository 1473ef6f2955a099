use std::path::Path;

use anyhow::Result;
use serde_json::{json, Value};

/// Optional pre-run probe. Its output is attached to failed runs only.
#[async_trait::async_trait]
pub trait DiagnosticsService: Send + Sync {
    async fn run(&self, workspace_path: &Path) -> Result<Value>;
}

/// Reports the git and claude versions and the state of the workspace.
pub struct EnvironmentDiagnostics {
    pub claude_bin: String,
}

impl Default for EnvironmentDiagnostics {
    fn default() -> Self {
        Self {
            claude_bin: "claude".into(),
        }
    }
}

async fn version_of(bin: &str) -> Value {
    match tokio::process::Command::new(bin)
        .arg("--version")
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(out) if out.status.success() => {
            Value::String(String::from_utf8_lossy(&out.stdout).trim().to_string())
        }
        Ok(out) => json!({ "error": format!("exit {}", out.status.code().unwrap_or(-1)) }),
        Err(e) => json!({ "error": e.to_string() }),
    }
}

#[async_trait::async_trait]
impl DiagnosticsService for EnvironmentDiagnostics {
    async fn run(&self, workspace_path: &Path) -> Result<Value> {
        Ok(json!({
            "workspace": {
                "path": workspace_path.display().to_string(),
                "exists": workspace_path.is_dir(),
                "checkout": workspace_path.join(".git").exists(),
            },
            "git": version_of("git").await,
            "claude": version_of(&self.claude_bin).await,
        }))
    }
}
