//! Request and response bodies of the tool service endpoints

use serde::{Deserialize, Serialize};

fn current_dir() -> String {
    crate::CURRENT_DIR.to_string()
}

/// `POST /read`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    /// Root-relative file path
    pub path: String,
}

/// Body of a successful read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResponse {
    /// File content, lossily decoded as UTF-8
    pub content: String,
}

/// `POST /write`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Root-relative file path
    pub path: String,
    /// New content of the file
    pub content: String,
}

/// Write acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    /// Always `true` on success
    pub ok: bool,
}

impl WriteResponse {
    /// Successful acknowledgement
    #[inline]
    #[must_use]
    pub fn ack() -> Self {
        Self { ok: true }
    }
}

/// `POST /list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    /// Root-relative directory, defaults to the root itself
    #[serde(default = "current_dir")]
    pub path: String,
}

impl Default for ListRequest {
    fn default() -> Self {
        Self { path: current_dir() }
    }
}

/// Directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    /// Immediate entry names, sorted
    pub entries: Vec<String>,
}

/// `POST /exec`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    /// Shell command line
    pub command: String,
    /// Root-relative working directory
    #[serde(default = "current_dir")]
    pub workdir: String,
    /// Wall-clock limit in seconds; the service default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl ExecRequest {
    /// Command in the root directory with the default timeout
    #[inline]
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            workdir: current_dir(),
            timeout: None,
        }
    }

    /// With working directory
    #[inline]
    #[must_use]
    pub fn in_dir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// With timeout in seconds
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }
}

/// Command result
///
/// `{output}` when the command exited zero, `{exit, output}` otherwise.
/// On non-zero exit the output is truncated by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResponse {
    /// Exit code, present only on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<i32>,
    /// Combined stdout/stderr
    pub output: String,
}

impl ExecResponse {
    /// Whether the command exited zero
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit.is_none()
    }

    /// Exit code, `0` on success
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.exit.unwrap_or(0)
    }
}

/// `POST /scan`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Root-relative file or directory to scan
    #[serde(default = "current_dir")]
    pub path: String,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self { path: current_dir() }
    }
}

/// Error response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable cause
    pub detail: String,
}

impl ErrorBody {
    /// Create error body
    #[inline]
    #[must_use]
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// `GET /healthz`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`
    pub status: String,
}

impl HealthResponse {
    /// Liveness response
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn optional_paths_default_to_root() {
        let list: ListRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(list.path, ".");

        let exec: ExecRequest = serde_json::from_value(json!({ "command": "ls" })).unwrap();
        assert_eq!(exec, ExecRequest::new("ls"));
    }

    #[test]
    fn exec_success_omits_exit() {
        let ok = ExecResponse {
            exit: None,
            output: "fine".to_string(),
        };
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({ "output": "fine" }));

        let failed: ExecResponse =
            serde_json::from_value(json!({ "exit": 2, "output": "boom" })).unwrap();
        assert!(!failed.succeeded());
        assert_eq!(failed.exit_code(), 2);
    }
}
