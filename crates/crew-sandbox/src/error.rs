//! Error types for the tool service

use std::time::Duration;

/// Tool service error
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Requested path or workdir resolves outside the sandbox root
    #[error("path escapes sandbox root: {0}")]
    PathEscape(String),

    /// Requested file or directory does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Command exceeded its wall-clock limit and was killed
    #[error("command `{command}` timed out after {}s", timeout.as_secs())]
    TimedOut {
        /// Command line that was killed
        command: String,
        /// Limit that was exceeded
        timeout: Duration,
    },

    /// Scanner failed or its report could not be parsed
    #[error("scan failed: {0}")]
    ScanFailure(String),

    /// Command could not be started
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// Command line
        command: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Other filesystem failure
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Root-relative path as requested
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl SandboxError {
    /// Wrap an I/O error, mapping `NotFound` to [`SandboxError::NotFound`]
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }

    /// Whether the caller sent a request the service must refuse
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::PathEscape(_) | Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn io_not_found_maps_to_not_found() {
        let err = SandboxError::io("a.txt", Error::from(ErrorKind::NotFound));
        assert!(matches!(err, SandboxError::NotFound(ref p) if p == "a.txt"));
        assert!(err.is_client_error());
    }

    #[test]
    fn other_io_stays_io() {
        let err = SandboxError::io("a.txt", Error::from(ErrorKind::PermissionDenied));
        assert!(matches!(err, SandboxError::Io { .. }));
        assert!(!err.is_client_error());
    }

    #[test]
    fn timed_out_display() {
        let err = SandboxError::TimedOut {
            command: "sleep 5".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(err.to_string(), "command `sleep 5` timed out after 1s");
    }
}
