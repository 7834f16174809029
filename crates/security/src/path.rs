//! Path validation — filesystem scoping for the file tools.
//!
//! Ensures tools only touch paths within their workspace (and whatever
//! the sandbox allows), and blocks traversal out of it.

use crate::sandbox::Sandbox;
use std::path::{Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Path '{path}' is outside the sandbox")]
    OutsideSandbox { path: String },

    #[error("Path '{path}' is outside allowed roots")]
    OutsideAllowedRoots { path: String },
}

/// Resolve a tool-supplied path against the workspace directory.
///
/// Absolute paths pass through unchanged; relative paths are joined
/// onto the workspace.
pub fn resolve_path(path: &str, workspace: &Path) -> PathBuf {
    if path.is_empty() {
        return workspace.to_path_buf();
    }
    let p = Path::new(path);
    if p.is_absolute() {
        return p.to_path_buf();
    }
    workspace.join(p)
}

/// Validate that a resolved path is safe for a tool to access.
///
/// Checks, in order:
/// 1. No `..` traversal components in the raw string
/// 2. The process-wide sandbox (everything passes while inactive)
/// 3. Allowed roots, when any are configured — the canonicalized path
///    (parent-canonicalized for not-yet-existing leaves) must lie
///    beneath one of them
pub fn validate_path(
    path: &Path,
    allowed_roots: &[PathBuf],
) -> Result<PathBuf, PathValidationError> {
    let raw = path.to_string_lossy();
    if raw.split('/').any(|component| component == "..") {
        return Err(PathValidationError::PathTraversal { path: raw.into() });
    }

    // Canonicalize to defeat symlink escapes. For paths that do not
    // exist yet (writes), canonicalize the parent and re-attach the
    // file name.
    let canonical = if path.exists() {
        path.canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
    } else if let Some(parent) = path.parent()
        && parent.exists()
        && let Ok(canonical_parent) = parent.canonicalize()
    {
        canonical_parent.join(path.file_name().unwrap_or_default())
    } else {
        path.to_path_buf()
    };

    if !Sandbox::global().is_path_allowed(&canonical) {
        return Err(PathValidationError::OutsideSandbox { path: raw.into() });
    }

    if !allowed_roots.is_empty() {
        let permitted = allowed_roots.iter().any(|root| canonical.starts_with(root));
        if !permitted {
            return Err(PathValidationError::OutsideAllowedRoots { path: raw.into() });
        }
    }

    Ok(canonical)
}
