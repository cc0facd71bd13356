//! Error types for Crew Core
//!
//! Provides error handling for:
//! - Agent tool loops (authorization, arguments, exhaustion)
//! - The text-completion backend
//! - Session storage
//! - Pipeline runs and submissions

use crate::types::{RunState, SessionId, StepId};
use crew_protocol::ToolName;
use crew_tools::ToolInvocationError;

/// Failure of a single agent while performing a step
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The backend asked for a tool outside the agent's permitted set
    #[error("agent `{agent}` is not permitted to use tool `{tool}`")]
    UnauthorizedTool {
        /// Role of the agent
        agent: String,
        /// Tool name as requested by the backend
        tool: String,
    },

    /// The requested tool call carried malformed arguments
    #[error("invalid arguments for tool `{tool}`: {reason}")]
    InvalidToolArguments {
        /// Tool being called
        tool: ToolName,
        /// What was wrong
        reason: String,
    },

    /// The tool loop hit its iteration bound without a final answer
    #[error("agent `{agent}` exhausted {max_iterations} tool iterations without a final answer")]
    AgentExhausted {
        /// Role of the agent
        agent: String,
        /// Configured bound
        max_iterations: usize,
    },

    /// The completion backend failed
    #[error("completion backend failed: {0}")]
    Backend(#[from] BackendError),

    /// A dispatched tool call failed
    #[error(transparent)]
    Tool(#[from] ToolInvocationError),
}

impl AgentError {
    /// Check if repeating the step may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Tool(e) if e.retryable)
    }
}

/// Text-completion backend errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The response did not have the expected shape
    #[error("undecodable response: {0}")]
    Decode(String),

    /// A scripted or mocked backend ran out of responses
    #[error("no completion available: {0}")]
    Exhausted(String),
}

/// Session store errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session with this id exists
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The underlying storage failed
    #[error("session storage error: {0}")]
    Storage(String),
}

/// A step failure as reported by a run
#[derive(Debug, thiserror::Error)]
#[error("step `{step}` failed: {source}")]
pub struct StepFailure {
    /// Step that failed
    pub step: StepId,
    /// Cause
    #[source]
    pub source: AgentError,
}

/// Main crew error type
#[derive(Debug, thiserror::Error)]
pub enum CrewError {
    /// Session storage failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The submitted artifact could not be placed in the workspace
    #[error("failed to store submitted artifact: {0}")]
    Artifact(#[source] ToolInvocationError),

    /// The submitted filename is not a single path component
    #[error("invalid filename `{0}`: must be a single path component")]
    InvalidFilename(String),

    /// A run attempted a transition outside the transition table
    #[error("illegal run transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: RunState,
        /// Requested state
        to: RunState,
    },
}

impl CrewError {
    /// Whether the caller supplied bad input
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidFilename(_))
    }
}
