//! PATH augmentation for launched commands.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// Prepend `extra_paths` to `current`, skipping duplicates and entries that
/// do not exist on this host.
///
/// Returns `None` only when both inputs are empty.
pub fn merge_path_env(current: Option<&OsStr>, extra_paths: &[PathBuf]) -> Option<OsString> {
    let existing: Vec<PathBuf> = current
        .map(|value| std::env::split_paths(value).collect())
        .unwrap_or_default();

    let extras = extra_paths.iter().filter(|path| path.is_dir()).cloned();

    let mut seen = HashSet::new();
    let merged: Vec<PathBuf> = extras
        .chain(existing)
        .filter(|path| !path.as_os_str().is_empty())
        .filter(|path| seen.insert(path.clone()))
        .collect();

    if merged.is_empty() {
        return None;
    }

    std::env::join_paths(merged).ok()
}

/// The host PATH with `extra_paths` merged in.
pub fn augmented_path(extra_paths: &[PathBuf]) -> OsString {
    let current = std::env::var_os("PATH");
    merge_path_env(current.as_deref(), extra_paths)
        .or(current)
        .unwrap_or_default()
}
