//! Workspace path sandbox.
//!
//! Every filesystem tool resolves its `path` argument through [`resolve`]
//! before touching the disk. A path is accepted only when it stays inside the
//! workspace root after lexical normalization, and when no existing symlink on
//! the way resolves to somewhere outside the root.

use crate::error::{RuntimeResult, ToolError};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Resolve `raw_path` against the workspace `root`.
///
/// Returns the absolute, normalized path under `root`. Errors echo `raw_path`
/// exactly as given and never the resolved location.
pub fn resolve(raw_path: &str, root: &Path) -> RuntimeResult<PathBuf> {
    if raw_path.trim().is_empty() {
        return Err(ToolError::EmptyPath);
    }

    let root = absolute_root(root)?;
    let candidate = normalize_lexically(&root.join(raw_path));

    if !is_inside(&relative_path(&root, &candidate)) {
        warn!(raw_path = %raw_path, "Rejected path outside workspace");
        return Err(ToolError::sandbox_violation(raw_path));
    }

    if escapes_through_symlink(&root, &candidate) {
        warn!(raw_path = %raw_path, "Rejected path escaping workspace through a symlink");
        return Err(ToolError::sandbox_violation(raw_path));
    }

    Ok(candidate)
}

fn absolute_root(root: &Path) -> RuntimeResult<PathBuf> {
    let absolute = std::path::absolute(root).map_err(|e| {
        ToolError::internal(format!("Cannot resolve workspace root '{}': {e}", root.display()))
    })?;
    Ok(normalize_lexically(&absolute))
}

/// Remove `.` segments and apply `..` segments without touching the
/// filesystem. `..` at the filesystem root stays at the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            Component::Normal(segment) => normalized.push(segment),
        }
    }
    normalized
}

/// Relative path from `from` to `to`. Both must be absolute and normalized.
///
/// When the two paths share no root (different drive prefixes) `to` is
/// returned unchanged, which is absolute.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from_parts: Vec<Component<'_>> = from.components().collect();
    let to_parts: Vec<Component<'_>> = to.components().collect();

    match (from_parts.first(), to_parts.first()) {
        (Some(a), Some(b)) if a == b => {}
        _ => return to.to_path_buf(),
    }

    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from_parts.len() {
        relative.push("..");
    }
    for part in &to_parts[common..] {
        relative.push(part.as_os_str());
    }
    relative
}

/// A relative path stays inside its base iff it is empty, not absolute and
/// does not start with `..`.
pub fn is_inside(relative: &Path) -> bool {
    if relative.as_os_str().is_empty() {
        return true;
    }
    if relative.is_absolute() || relative.has_root() {
        return false;
    }
    !matches!(relative.components().next(), Some(Component::ParentDir))
}

/// Check the deepest existing entry on the way to `candidate` against the
/// real location of `root`. Skipped when the root itself cannot be
/// canonicalized (e.g. it does not exist yet).
fn escapes_through_symlink(root: &Path, candidate: &Path) -> bool {
    let Ok(real_root) = root.canonicalize() else {
        return false;
    };

    let mut current = Some(candidate);
    while let Some(path) = current {
        if path.symlink_metadata().is_ok() {
            return match path.canonicalize() {
                Ok(real) => !real.starts_with(&real_root),
                // Dangling symlink; its target cannot be checked.
                Err(_) => true,
            };
        }
        current = path.parent();
    }
    false
}
