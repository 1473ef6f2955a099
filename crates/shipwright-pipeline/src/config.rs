use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::credential::Credential;

/// Pipeline configuration.
///
/// Loaded from `{store root}/config.json` (the file `shipwright config`
/// edits), then overlaid with environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Apply unified-diff blocks found in model output.
    pub apply_patches: bool,
    /// Write fenced code blocks that name a path into the workspace.
    pub legacy_code_block_fallback: bool,
    /// Global automation kill switch.
    pub automation_kill_switch: bool,
    /// Host used to synthesize clone URLs from owner/name.
    pub git_host: String,
    /// Model used for the secondary commit-message call. `None` disables it.
    pub commit_message_model: Option<String>,
    pub branch_prefix: String,
    /// Where sessions and workspaces live. Defaults to the store root.
    pub store_root: Option<PathBuf>,
    /// Fallback hosting token, only ever read from the environment.
    #[serde(skip)]
    pub ambient_credential: Option<Credential>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            apply_patches: false,
            legacy_code_block_fallback: false,
            automation_kill_switch: false,
            git_host: "github.com".to_string(),
            commit_message_model: Some("haiku".to_string()),
            branch_prefix: "shipwright".to_string(),
            store_root: None,
            ambient_credential: None,
        }
    }
}

impl PipelineConfig {
    /// Load `config.json` under `root` (missing file = defaults) and apply
    /// the process environment.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let mut config = Self::from_file(&shipwright_store::config_path(root))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok(config)
    }

    /// Overlay environment variables read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("SHIPWRIGHT_AUTOMATION_DISABLED") {
            self.automation_kill_switch = parse_bool(&v);
        }
        if let Some(v) = var("SHIPWRIGHT_APPLY_PATCHES") {
            self.apply_patches = parse_bool(&v);
        }
        if let Some(v) = var("SHIPWRIGHT_GIT_HOST").filter(|v| !v.trim().is_empty()) {
            self.git_host = v.trim().to_string();
        }
        for key in ["GITHUB_TOKEN", "GH_TOKEN"] {
            if let Some(token) = var(key).filter(|t| !t.trim().is_empty()) {
                self.ambient_credential = Some(Credential::new(token.trim(), "ambient"));
                break;
            }
        }
    }

    pub fn root(&self) -> PathBuf {
        self.store_root
            .clone()
            .unwrap_or_else(shipwright_store::store_root)
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert!(!c.apply_patches);
        assert!(!c.legacy_code_block_fallback);
        assert!(!c.automation_kill_switch);
        assert_eq!(c.git_host, "github.com");
        assert_eq!(c.branch_prefix, "shipwright");
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = PipelineConfig::from_file(&dir.path().join("config.json")).unwrap();
        assert_eq!(c.git_host, "github.com");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"apply_patches": true, "unknown_key": 1}"#).unwrap();
        let c = PipelineConfig::from_file(&path).unwrap();
        assert!(c.apply_patches);
        assert_eq!(c.branch_prefix, "shipwright");
    }

    #[test]
    fn env_overlay() {
        let env: HashMap<&str, &str> = [
            ("SHIPWRIGHT_AUTOMATION_DISABLED", "yes"),
            ("GH_TOKEN", "gho_fallback"),
        ]
        .into_iter()
        .collect();
        let mut c = PipelineConfig::default();
        c.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert!(c.automation_kill_switch);
        let cred = c.ambient_credential.unwrap();
        assert_eq!(cred.expose(), "gho_fallback");
        assert_eq!(cred.source, "ambient");
    }

    #[test]
    fn github_token_wins_over_gh_token() {
        let mut c = PipelineConfig::default();
        c.apply_env(|k| match k {
            "GITHUB_TOKEN" => Some("first".into()),
            "GH_TOKEN" => Some("second".into()),
            _ => None,
        });
        assert_eq!(c.ambient_credential.unwrap().expose(), "first");
    }
}
