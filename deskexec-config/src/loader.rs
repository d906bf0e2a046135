use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::commands::CommandsConfig;
use crate::constants::loader as loader_constants;
use crate::debug::DebugConfig;
use crate::server::ServerConfig;
use crate::timeouts::TimeoutsConfig;
use crate::workspace::WorkspaceConfig;

/// Root configuration document (`deskexec.toml`).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DeskexecConfig {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

impl DeskexecConfig {
    pub fn validate(&self, base: &Path) -> Result<()> {
        self.workspace.validate(base)?;
        self.commands.validate()?;
        self.timeouts.validate()?;
        self.server.validate()?;
        Ok(())
    }
}

/// Configuration manager for loading and validating configurations
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: DeskexecConfig,
    config_path: Option<PathBuf>,
    base_dir: PathBuf,
}

impl ConfigManager {
    /// Load configuration from the default locations.
    ///
    /// `DESKEXEC_CONFIG_PATH` wins, then `deskexec.toml` in the current
    /// directory, then built-in defaults.
    pub fn load() -> Result<Self> {
        if let Ok(config_path) = std::env::var(loader_constants::CONFIG_PATH_ENV) {
            let trimmed = config_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_file(trimmed).with_context(|| {
                    format!(
                        "Failed to load configuration from {}={}",
                        loader_constants::CONFIG_PATH_ENV,
                        trimmed
                    )
                });
            }
        }

        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        Self::load_from_dir(cwd)
    }

    /// Load `deskexec.toml` from `dir`, falling back to defaults rooted there.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let candidate = dir.join(loader_constants::CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Self::load_from_file(&candidate);
        }

        tracing::debug!(dir = %dir.display(), "no config file found; using defaults");
        Ok(Self::from_config(DeskexecConfig::default(), dir).apply_env_overrides())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: DeskexecConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        let base_dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        tracing::debug!(path = %path.display(), "loaded configuration file");
        let mut manager = Self::from_config(config, base_dir).apply_env_overrides();
        manager.config_path = Some(path.to_path_buf());
        Ok(manager)
    }

    /// Wrap an in-memory configuration; relative paths resolve against `base_dir`.
    pub fn from_config(config: DeskexecConfig, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            config_path: None,
            base_dir: base_dir.into(),
        }
    }

    fn apply_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var(loader_constants::PROJECT_ROOT_ENV) {
            let trimmed = root.trim();
            if !trimmed.is_empty() {
                self.config.workspace.project_root = Some(PathBuf::from(trimmed));
            }
        }
        self
    }

    pub fn config(&self) -> &DeskexecConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut DeskexecConfig {
        &mut self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Absolute project root for the loaded configuration.
    pub fn project_root(&self) -> PathBuf {
        self.config.workspace.resolve_root(&self.base_dir)
    }

    pub fn validate(&self) -> Result<()> {
        self.config.validate(&self.base_dir)
    }
}
