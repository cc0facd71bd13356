//! Tool service configuration

use std::path::PathBuf;
use std::time::Duration;

/// Default wall-clock limit for commands
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for requested command timeouts
pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_secs(300);

/// Characters of output kept when a command exits non-zero
pub const DEFAULT_FAILURE_OUTPUT_LIMIT: usize = 400;

/// Bytes of combined output held in memory per command
pub const DEFAULT_CAPTURE_LIMIT: usize = 1024 * 1024;

/// Sandbox configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Directory every operation is confined to
    pub root: PathBuf,
    /// Timeout applied when a request does not name one
    pub default_timeout: Duration,
    /// Upper bound for requested timeouts
    pub max_timeout: Duration,
    /// Output truncation bound on non-zero exit, in characters
    pub failure_output_limit: usize,
    /// In-memory capture bound, in bytes
    pub capture_limit: usize,
    /// Scanner command line, e.g. `bandit`
    pub scanner_command: String,
    /// Wall-clock limit for one scan
    pub scan_timeout: Duration,
}

impl SandboxConfig {
    /// Configuration with defaults for the given root
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            default_timeout: DEFAULT_EXEC_TIMEOUT,
            max_timeout: DEFAULT_MAX_TIMEOUT,
            failure_output_limit: DEFAULT_FAILURE_OUTPUT_LIMIT,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            scanner_command: "bandit".to_string(),
            scan_timeout: Duration::from_secs(120),
        }
    }

    /// With default command timeout
    #[inline]
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// With maximum command timeout
    #[inline]
    #[must_use]
    pub fn with_max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = timeout;
        self
    }

    /// With failure output bound
    #[inline]
    #[must_use]
    pub fn with_failure_output_limit(mut self, chars: usize) -> Self {
        self.failure_output_limit = chars;
        self
    }

    /// With capture bound
    #[inline]
    #[must_use]
    pub fn with_capture_limit(mut self, bytes: usize) -> Self {
        self.capture_limit = bytes;
        self
    }

    /// With scanner command line
    #[inline]
    #[must_use]
    pub fn with_scanner(mut self, command_line: impl Into<String>) -> Self {
        self.scanner_command = command_line.into();
        self
    }

    /// With scan timeout
    #[inline]
    #[must_use]
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Effective timeout for a request
    #[must_use]
    pub fn effective_timeout(&self, requested_secs: Option<u64>) -> Duration {
        requested_secs
            .map_or(self.default_timeout, Duration::from_secs)
            .min(self.max_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SandboxConfig::new("/code");
        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert_eq!(config.failure_output_limit, 400);
        assert_eq!(config.scanner_command, "bandit");
    }

    #[test]
    fn requested_timeout_is_capped() {
        let config = SandboxConfig::new("/code").with_max_timeout(Duration::from_secs(60));
        assert_eq!(config.effective_timeout(None), Duration::from_secs(30));
        assert_eq!(config.effective_timeout(Some(5)), Duration::from_secs(5));
        assert_eq!(config.effective_timeout(Some(600)), Duration::from_secs(60));
    }
}
