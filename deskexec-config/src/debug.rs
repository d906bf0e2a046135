use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::debug as debug_constants;

/// Tracing configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DebugConfig {
    /// Level applied to `trace_targets` when `RUST_LOG` is not set
    #[serde(default = "default_trace_level")]
    pub trace_level: String,

    /// Crates the level applies to
    #[serde(default = "default_trace_targets")]
    pub trace_targets: Vec<String>,

    /// Log file used by the console, which owns the terminal and cannot log
    /// to stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            trace_level: default_trace_level(),
            trace_targets: default_trace_targets(),
            log_file: None,
        }
    }
}

impl DebugConfig {
    /// `EnvFilter` directive string such as `deskexec=info,deskexec_runner=info`.
    pub fn filter_directive(&self) -> String {
        self.trace_targets
            .iter()
            .map(|target| format!("{target}={}", self.trace_level))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn console_log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(debug_constants::DEFAULT_CONSOLE_LOG_FILE))
    }
}

fn default_trace_level() -> String {
    debug_constants::DEFAULT_TRACE_LEVEL.into()
}

fn default_trace_targets() -> Vec<String> {
    debug_constants::DEFAULT_TRACE_TARGETS
        .iter()
        .map(|value| (*value).into())
        .collect()
}
