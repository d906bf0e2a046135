use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::error::{ExecError, ExecResult};

/// Normalize a path by resolving `.` and `..` components lexically.
///
/// `..` never climbs above the filesystem root.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// Canonicalize a path, falling back to its lexically normalized absolute
/// form when it does not exist yet.
///
/// The result is relative (possibly empty) only when no absolute form can be
/// built at all; [`ProjectRoot::resolve`] refuses every request then.
pub fn canonicalize_root(root: &Path) -> PathBuf {
    let error = match std::fs::canonicalize(root) {
        Ok(canonical) => return canonical,
        Err(error) => error,
    };
    match std::path::absolute(root) {
        Ok(absolute) => {
            warn!(
                path = %root.display(),
                %error,
                "Failed to canonicalize project root; using its absolute form"
            );
            normalize_path(&absolute)
        }
        Err(absolute_error) => {
            warn!(
                path = %root.display(),
                %error,
                %absolute_error,
                "Project root cannot be made absolute; every working directory will be refused"
            );
            normalize_path(root)
        }
    }
}

/// Fixed directory bounding every working directory an execution may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRoot {
    root: PathBuf,
}

impl ProjectRoot {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: canonicalize_root(root.as_ref()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a caller-supplied directory against the root.
    ///
    /// `None` or a blank string yields the root itself. The check is purely
    /// lexical; whether the directory exists is left to the launcher.
    pub fn resolve(&self, requested: Option<&str>) -> ExecResult<PathBuf> {
        if !self.root.is_absolute() {
            return Err(ExecError::PathEscape {
                requested: requested.unwrap_or_default().trim().to_owned(),
                root: self.root.clone(),
            });
        }
        let Some(requested) = requested.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(self.root.clone());
        };

        let candidate = normalize_path(&self.root.join(requested));
        if candidate.starts_with(&self.root) {
            Ok(candidate)
        } else {
            Err(ExecError::PathEscape {
                requested: requested.to_owned(),
                root: self.root.clone(),
            })
        }
    }
}
