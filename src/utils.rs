//! Shared path helpers.

use std::path::{Component, Path, PathBuf};

/// Normalize a path to an absolute form for identity comparisons.
///
/// Canonicalizes (resolving symlinks) when the path exists; otherwise falls
/// back to a lexical absolutization so paths that are about to be created
/// (move destinations, recorded answers) still normalize deterministically.
pub fn to_abs(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    clean_components(&absolute)
}

/// Remove `.` components and resolve `..` lexically.
fn clean_components(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push(component.as_os_str());
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_user(input: &str) -> PathBuf {
    if let Some(rest) = input.strip_prefix('~') {
        let home = if cfg!(windows) {
            std::env::var("USERPROFILE")
        } else {
            std::env::var("HOME")
        };
        if let Ok(home) = home {
            return PathBuf::from(home).join(rest.trim_start_matches(['/', '\\']));
        }
    }
    PathBuf::from(input)
}

/// Dot-prefix check used for hidden-directory pruning.
pub fn is_hidden_name(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
