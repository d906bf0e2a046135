use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Project root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct WorkspaceConfig {
    /// Directory every execution is confined to. Relative values are
    /// resolved against the directory the config was loaded from; unset
    /// means the current working directory.
    #[serde(default)]
    pub project_root: Option<PathBuf>,
}

impl WorkspaceConfig {
    /// Absolute project root, resolving relative values against `base`.
    pub fn resolve_root(&self, base: &Path) -> PathBuf {
        match &self.project_root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => base.join(root),
            None => base.to_path_buf(),
        }
    }

    pub fn validate(&self, base: &Path) -> Result<()> {
        let root = self.resolve_root(base);
        let metadata = std::fs::metadata(&root)
            .with_context(|| format!("project root {} is not accessible", root.display()))?;
        ensure!(
            metadata.is_dir(),
            "project root {} is not a directory",
            root.display()
        );
        Ok(())
    }
}
