//! Error types shared by the validator, resolver, launcher and registry.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::registry::ExecutionId;

/// Message reported when a cancel targets an unknown or finished execution.
pub const NOT_FOUND_MESSAGE: &str = "command not found or already finished";

#[derive(Debug, Error)]
pub enum ExecError {
    /// Disallowed base command, forbidden character or empty input.
    #[error("{0}")]
    InvalidCommand(String),

    /// The requested working directory resolves outside the project root.
    #[error("working directory `{requested}` escapes the project root `{}`", root.display())]
    PathEscape { requested: String, root: PathBuf },

    #[error("{NOT_FOUND_MESSAGE}")]
    NotFound(ExecutionId),

    /// The OS refused to create the process.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

impl ExecError {
    pub fn invalid_command(message: impl Into<String>) -> Self {
        ExecError::InvalidCommand(message.into())
    }

    /// True for errors raised before any process exists.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ExecError::InvalidCommand(_) | ExecError::PathEscape { .. }
        )
    }
}

pub type ExecResult<T> = Result<T, ExecError>;
