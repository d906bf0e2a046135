use std::path::PathBuf;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use crate::constants::commands as command_constants;

/// Command execution configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CommandsConfig {
    /// Base commands that may be launched. Matched case-sensitively against
    /// the first whitespace-delimited token of a request.
    #[serde(default = "default_allow_list")]
    pub allow_list: Vec<String>,

    /// Directories prepended to PATH for every launched command
    #[serde(default = "default_extra_path_entries")]
    pub extra_path_entries: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            allow_list: default_allow_list(),
            extra_path_entries: default_extra_path_entries(),
        }
    }
}

impl CommandsConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.allow_list.is_empty(),
            "commands.allow_list must contain at least one command"
        );
        for entry in &self.allow_list {
            ensure!(
                !entry.trim().is_empty() && !entry.chars().any(char::is_whitespace),
                "commands.allow_list entries must be single base commands, got `{entry}`"
            );
            ensure!(
                !entry.contains(command_constants::FORBIDDEN_CHARACTERS),
                "commands.allow_list entry `{entry}` contains a forbidden character"
            );
        }
        Ok(())
    }

    /// Extra PATH entries with a leading `~` expanded to the home directory.
    ///
    /// Entries that reference the home directory are dropped when it cannot
    /// be determined.
    pub fn resolved_extra_paths(&self) -> Vec<PathBuf> {
        self.extra_path_entries
            .iter()
            .filter_map(|entry| expand_home(entry.trim()))
            .collect()
    }
}

fn expand_home(entry: &str) -> Option<PathBuf> {
    if entry.is_empty() {
        return None;
    }
    if entry == "~" {
        return dirs::home_dir();
    }
    match entry.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(entry)),
    }
}

fn default_allow_list() -> Vec<String> {
    command_constants::DEFAULT_ALLOW_LIST
        .iter()
        .map(|value| (*value).into())
        .collect()
}

fn default_extra_path_entries() -> Vec<String> {
    command_constants::DEFAULT_EXTRA_PATH_ENTRIES
        .iter()
        .map(|value| (*value).into())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allow_list_covers_listing_and_toolchains() {
        let config = CommandsConfig::default();
        for command in ["ls", "pwd", "cat", "node", "python3", "go", "cargo", "git"] {
            assert!(
                config.allow_list.iter().any(|entry| entry == command),
                "{command} missing from default allow list"
            );
        }
        assert!(!config.allow_list.iter().any(|entry| entry == "rm"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_multi_word_allow_list_entries() {
        let config = CommandsConfig {
            allow_list: vec!["git status".into()],
            ..CommandsConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_allow_list() {
        let config = CommandsConfig {
            allow_list: Vec::new(),
            ..CommandsConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn expands_home_prefixed_entries() {
        let config = CommandsConfig {
            allow_list: vec!["ls".into()],
            extra_path_entries: vec!["/opt/tools/bin".into(), "~/.cargo/bin".into(), "  ".into()],
        };
        let resolved = config.resolved_extra_paths();
        assert_eq!(resolved.first(), Some(&PathBuf::from("/opt/tools/bin")));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolved.get(1), Some(&home.join(".cargo/bin")));
            assert_eq!(resolved.len(), 2);
        }
    }
}
