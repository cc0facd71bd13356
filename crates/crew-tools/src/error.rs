//! Failures of a tool invocation as seen by the caller

use reqwest::StatusCode;

/// Why a tool invocation failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolErrorCause {
    /// The tool service could not be reached or did not answer in time
    #[error("tool service unreachable: {0}")]
    Connect(String),

    /// The service rejected a path outside its root
    #[error("path escapes the sandbox: {0}")]
    PathEscape(String),

    /// The requested file or directory does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The command exceeded its wall-clock limit
    #[error("command timed out: {0}")]
    TimedOut(String),

    /// The static-analysis scan produced no usable report
    #[error("scan failed: {0}")]
    ScanFailure(String),

    /// Any other non-success status
    #[error("tool service returned {status}: {detail}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Error detail reported by the service
        detail: String,
    },

    /// The response body did not match the protocol
    #[error("undecodable response: {0}")]
    Decode(String),
}

/// A failed tool call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("tool `{tool}` failed: {cause}")]
pub struct ToolInvocationError {
    /// Name of the tool (or endpoint) that failed
    pub tool: String,
    /// Classified cause
    pub cause: ToolErrorCause,
    /// Whether repeating the identical call may succeed
    pub retryable: bool,
}

impl ToolInvocationError {
    /// Build an error; only transport failures are retryable
    #[must_use]
    pub fn new(tool: impl Into<String>, cause: ToolErrorCause) -> Self {
        let retryable = matches!(cause, ToolErrorCause::Connect(_));
        Self {
            tool: tool.into(),
            cause,
            retryable,
        }
    }

    /// Classify a non-success response of `endpoint`
    ///
    /// The service answers 400 only for path escapes; a request body it
    /// cannot decode is 422 and lands in `Server`.
    #[must_use]
    pub fn from_status(endpoint: &str, status: StatusCode, detail: String) -> Self {
        let cause = match status {
            StatusCode::BAD_REQUEST => ToolErrorCause::PathEscape(detail),
            StatusCode::NOT_FOUND => ToolErrorCause::NotFound(detail),
            StatusCode::GATEWAY_TIMEOUT => ToolErrorCause::TimedOut(detail),
            StatusCode::INTERNAL_SERVER_ERROR if endpoint == "scan" => {
                ToolErrorCause::ScanFailure(detail)
            }
            other => ToolErrorCause::Server {
                status: other.as_u16(),
                detail,
            },
        };
        Self::new(endpoint, cause)
    }

    /// Classify a transport-level failure
    ///
    /// Only a failure to connect is retryable. A request that timed out or
    /// broke after it was sent may already have run on the service.
    #[must_use]
    pub fn from_transport(endpoint: &str, err: &reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::new(endpoint, ToolErrorCause::Decode(err.to_string()));
        }
        let mut error = Self::new(endpoint, ToolErrorCause::Connect(err.to_string()));
        error.retryable = err.is_connect();
        error
    }

    /// Report the failure under a different tool name
    #[inline]
    #[must_use]
    pub fn for_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }
}
