//! Sandbox root and path confinement
//!
//! Resolution happens in two passes, both before any mutation:
//! 1. Lexical: join with the root and fold `.`/`..`; leaving the root fails
//! 2. Physical: canonicalize the longest existing ancestor so symlinks are
//!    followed; the result must still lie under the canonical root
//!
//! The not-yet-existing tail (e.g. the file about to be written) is
//! re-appended after the physical check. It contains only normal
//! components, so it cannot climb back out.

use crate::error::SandboxError;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Canonical directory all operations are confined to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRoot {
    root: PathBuf,
}

impl SandboxRoot {
    /// Open (and create if missing) a sandbox root
    ///
    /// # Errors
    /// Returns `Io` if the directory cannot be created or canonicalized
    pub fn open(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let root = root.as_ref();
        let display = root.display().to_string();
        std::fs::create_dir_all(root).map_err(|e| SandboxError::io(&display, e))?;
        let root = root
            .canonicalize()
            .map_err(|e| SandboxError::io(&display, e))?;
        Ok(Self { root })
    }

    /// Canonical root path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a requested path to an absolute path under the root
    ///
    /// # Errors
    /// - `PathEscape` if the path leaves the root lexically or via symlinks
    /// - `Io` if an ancestor cannot be inspected
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, SandboxError> {
        let joined = self.root.join(requested);
        let normalized = normalize(&joined);
        if !normalized.starts_with(&self.root) {
            return Err(SandboxError::PathEscape(requested.to_string()));
        }

        let mut existing = normalized;
        let mut tail: Vec<OsString> = Vec::new();
        loop {
            match existing.canonicalize() {
                Ok(canonical) => {
                    if !canonical.starts_with(&self.root) {
                        return Err(SandboxError::PathEscape(requested.to_string()));
                    }
                    let mut resolved = canonical;
                    resolved.extend(tail.iter().rev());
                    return Ok(resolved);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    let Some(name) = existing.file_name() else {
                        return Err(SandboxError::PathEscape(requested.to_string()));
                    };
                    tail.push(name.to_os_string());
                    existing.pop();
                }
                Err(e) => return Err(SandboxError::io(requested, e)),
            }
        }
    }

    /// Render an absolute path relative to the root, for messages
    #[must_use]
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .map_or_else(|_| path.display().to_string(), |p| p.display().to_string())
    }
}

/// Fold `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(segment) => out.push(segment),
        }
    }
    out
}
