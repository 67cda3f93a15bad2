//! Working directory validation
//!
//! A session may only run inside the user's home directory, the system temp
//! directory, or an explicitly configured root. Paths are canonicalized
//! first, so `..` segments and symlinks cannot escape.

use std::path::{Path, PathBuf};

use crate::error::{BridgeError, Result};

/// Roots every bridge accepts
#[must_use]
pub fn default_allowed_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(home) = dirs::home_dir() {
        roots.push(home);
    }
    roots.push(PathBuf::from("/tmp"));
    roots.push(std::env::temp_dir());
    roots
}

/// Check `path` against the default roots plus `extra_roots`
///
/// Returns the canonical path on success.
///
/// # Errors
/// Returns `BridgeError::InvalidWorkDir` if the path is relative, missing,
/// not a directory, or outside every allowed root
pub fn validate_work_dir(path: &Path, extra_roots: &[PathBuf]) -> Result<PathBuf> {
    if !path.is_absolute() {
        return Err(BridgeError::invalid_work_dir(format!(
            "{} is not an absolute path",
            path.display()
        )));
    }

    let canonical = path.canonicalize().map_err(|e| {
        BridgeError::invalid_work_dir(format!("{}: {e}", path.display()))
    })?;
    if !canonical.is_dir() {
        return Err(BridgeError::invalid_work_dir(format!(
            "{} is not a directory",
            canonical.display()
        )));
    }

    let allowed = default_allowed_roots()
        .iter()
        .chain(extra_roots)
        .filter_map(|root| root.canonicalize().ok())
        .any(|root| canonical.starts_with(root));
    if !allowed {
        return Err(BridgeError::invalid_work_dir(format!(
            "{} is outside the allowed directories",
            canonical.display()
        )));
    }

    Ok(canonical)
}

/// Whether `path` is acceptable under the default roots
#[must_use]
pub fn is_valid_work_dir(path: &Path) -> bool {
    validate_work_dir(path, &[]).is_ok()
}
