use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use deskexec_config::{ConfigManager, DebugConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LogSink {
    Stderr,
    /// The console owns the terminal, so its logs go to a file.
    File(PathBuf),
}

/// Initialize tracing. `RUST_LOG` takes precedence over the configured
/// level and targets.
pub(crate) fn initialize_tracing(debug: &DebugConfig, sink: &LogSink) -> Result<()> {
    let directive = debug.filter_directive();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

    let init_result = match sink {
        LogSink::Stderr => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogSink::File(path) => {
            let file = open_log_file(path)?;
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Arc::new(file))
                        .with_ansi(false),
                )
                .try_init()
        }
    };

    if let Err(err) = init_result {
        tracing::warn!(error = %err, "tracing already initialized; skipping setup");
    }
    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Load configuration from `--config` when given, else from the default
/// locations.
pub(crate) fn load_config(path: Option<&Path>) -> Result<ConfigManager> {
    match path {
        Some(path) => ConfigManager::load_from_file(path),
        None => ConfigManager::load(),
    }
}

/// Make a command-line path absolute against the current directory.
pub(crate) fn absolute_from_cwd(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    Ok(cwd.join(path))
}

/// Base URL of a server bound to `bind_address`.
pub(crate) fn server_url(bind_address: &str) -> String {
    let address = bind_address
        .strip_prefix("0.0.0.0:")
        .map(|port| format!("127.0.0.1:{port}"))
        .unwrap_or_else(|| bind_address.to_owned());
    format!("http://{address}")
}
