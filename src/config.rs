//! Benchd configuration loaded from `benchd.toml`

use crate::models::ModelRef;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_snapshots_enabled() -> bool {
    true
}

fn default_children() -> usize {
    2
}

/// Benchd configuration
///
/// All fields are optional in the file; a missing `benchd.toml` yields the
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchdConfig {
    /// Root directory for snapshots, worktrees and session records.
    /// Defaults to the platform data dir (`~/.local/share/benchd` on Linux).
    #[serde(default)]
    pub data_root: Option<PathBuf>,

    /// Whether snapshotting is enabled at all
    #[serde(default = "default_snapshots_enabled")]
    pub snapshots_enabled: bool,

    /// Number of children created when `start` is given no explicit models
    #[serde(default = "default_children")]
    pub default_children: usize,

    /// Fallback model (`provider/model`) when the parent session has none
    #[serde(default)]
    pub default_model: Option<String>,
}

impl Default for BenchdConfig {
    fn default() -> Self {
        Self {
            data_root: None,
            snapshots_enabled: default_snapshots_enabled(),
            default_children: default_children(),
            default_model: None,
        }
    }
}

impl BenchdConfig {
    /// Load config from `<workspace>/benchd.toml`, falling back to defaults
    pub fn load(workspace: &Path) -> Result<Self> {
        let config_path = workspace.join("benchd.toml");
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: BenchdConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        Ok(config)
    }

    /// Effective data root: configured value, platform data dir, or a
    /// `.benchd` directory next to the workspace as a last resort
    pub fn data_root(&self, workspace: &Path) -> PathBuf {
        if let Some(root) = &self.data_root {
            return root.clone();
        }
        match dirs::data_dir() {
            Some(dir) => dir.join("benchd"),
            None => workspace.join(".benchd"),
        }
    }

    /// Parsed `default_model`, if present and well-formed
    pub fn default_model_ref(&self) -> Option<ModelRef> {
        self.default_model.as_deref().and_then(|s| s.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = BenchdConfig::load(dir.path()).unwrap();
        assert!(config.snapshots_enabled);
        assert_eq!(config.default_children, 2);
        assert!(config.default_model.is_none());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("benchd.toml"),
            "default_model = \"anthropic/claude-sonnet-4\"\n",
        )
        .unwrap();

        let config = BenchdConfig::load(dir.path()).unwrap();
        assert!(config.snapshots_enabled);
        assert_eq!(config.default_children, 2);
        assert_eq!(
            config.default_model_ref(),
            Some(ModelRef::new("anthropic", "claude-sonnet-4"))
        );
    }

    #[test]
    fn test_configured_data_root_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("benchd.toml"),
            "data_root = \"/tmp/benchd-data\"\nsnapshots_enabled = false\n",
        )
        .unwrap();

        let config = BenchdConfig::load(dir.path()).unwrap();
        assert!(!config.snapshots_enabled);
        assert_eq!(
            config.data_root(dir.path()),
            PathBuf::from("/tmp/benchd-data")
        );
    }
}
