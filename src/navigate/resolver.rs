//! Path resolution and root confinement.
//!
//! The current directory of a session is kept as a normalized path relative
//! to the root ("" is the root itself, "a/b" a nested directory). Requested
//! paths starting with `/` are taken relative to the root, anything else
//! relative to the current directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PathError;

/// A requested path after normalization and confinement checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Location on disk, always inside the root
    pub absolute: PathBuf,
    /// Normalized path relative to the root, without a leading separator
    pub relative: String,
}

impl ResolvedPath {
    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }

    /// Path as shown to the client, e.g. `/sub/file.txt`
    pub fn display(&self) -> String {
        display_path(&self.relative)
    }
}

/// Returns true for arguments that denote the root directory itself.
pub fn is_root_marker(path: &str) -> bool {
    matches!(path.trim(), "" | "/" | "\\")
}

/// Resolves `requested` against `current_dir` and confines it to `root`.
///
/// `.` segments and empty segments are dropped, `..` removes the previous
/// segment. Any `..` that would climb above the root rejects the whole path,
/// whatever the current directory is.
pub fn resolve(root: &Path, current_dir: &str, requested: &str) -> Result<ResolvedPath, PathError> {
    let requested = requested.trim();

    let mut segments: Vec<&str> = Vec::new();
    if !is_root_marker(requested) {
        if !requested.starts_with('/') {
            segments.extend(current_dir.split('/').filter(|s| !s.is_empty() && *s != "."));
        }

        for segment in requested.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(PathError::EscapesRoot(requested.to_string()));
                    }
                }
                name => segments.push(name),
            }
        }
    }

    let relative = segments.join("/");
    let absolute = segments
        .iter()
        .fold(root.to_path_buf(), |path, segment| path.join(segment));

    // Final guard: the joined path must still sit under the root.
    if !absolute.starts_with(root) {
        return Err(PathError::EscapesRoot(requested.to_string()));
    }
    confine_links(root, &absolute, requested)?;

    Ok(ResolvedPath { absolute, relative })
}

/// Rejects paths that leave the root through a symbolic link.
///
/// The deepest component of `absolute` present on disk is canonicalized and
/// must still lie under the canonical root. Components that do not exist yet
/// (a STOR or MKD target) cannot point anywhere. A link that cannot be
/// resolved, dangling or looping, is rejected.
fn confine_links(root: &Path, absolute: &Path, requested: &str) -> Result<(), PathError> {
    let escapes = || PathError::EscapesRoot(requested.to_string());
    let canonical_root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());

    let mut candidate = absolute;
    loop {
        if fs::symlink_metadata(candidate).is_ok() {
            let real = fs::canonicalize(candidate).map_err(|_| escapes())?;
            return if real.starts_with(&canonical_root) {
                Ok(())
            } else {
                Err(escapes())
            };
        }
        match candidate.parent() {
            Some(parent) if candidate != root && parent.starts_with(root) => candidate = parent,
            _ => return Ok(()),
        }
    }
}

/// Parent of a normalized relative directory, or `None` when already at root.
pub fn parent_of(current_dir: &str) -> Option<String> {
    if current_dir.is_empty() {
        return None;
    }
    Some(match current_dir.rfind('/') {
        Some(idx) => current_dir[..idx].to_string(),
        None => String::new(),
    })
}

/// Client-facing form of a relative path; the root is shown as `/`.
pub fn display_path(relative: &str) -> String {
    format!("/{}", relative)
}
