//! Core types for the pipeline
//!
//! Defines the identifiers and records shared across the crate:
//! - Session identifiers
//! - Step identifiers and the ordered step-result mapping
//! - Run states of a pipeline execution

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Length of a session identifier in hex characters
pub const SESSION_ID_LEN: usize = 8;

/// Opaque session token: 8 lowercase hex characters
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier from a random UUID
    #[must_use]
    pub fn generate() -> Self {
        let mut hex = Uuid::new_v4().simple().to_string();
        hex.truncate(SESSION_ID_LEN);
        Self(hex)
    }

    /// The identifier as text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rejected session identifier text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid session id `{0}`: expected {SESSION_ID_LEN} lowercase hex characters")]
pub struct InvalidSessionId(pub String);

impl FromStr for SessionId {
    type Err = InvalidSessionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == SESSION_ID_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidSessionId(s.to_string()))
        }
    }
}

impl TryFrom<String> for SessionId {
    type Error = InvalidSessionId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// One stage of the fixed pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    /// Describe what the code does
    Summarize,
    /// Find bugs, failing tests and security issues
    Analyze,
    /// Propose changes resolving the findings
    Plan,
    /// Apply the plan and re-run the tests
    Rewrite,
}

impl StepId {
    /// All steps in execution order
    pub const ALL: [StepId; 4] = [Self::Summarize, Self::Analyze, Self::Plan, Self::Rewrite];

    /// Wire name of the step
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Analyze => "analyze",
            Self::Plan => "plan",
            Self::Rewrite => "rewrite",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered mapping of completed steps to their outputs
pub type StepResults = IndexMap<StepId, String>;

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "step")]
pub enum RunState {
    /// Built but not started
    Pending,
    /// Executing the step at this index
    Running(usize),
    /// Every step produced output
    Completed,
    /// A step failed; later steps were not run
    Failed,
}

impl RunState {
    /// Whether the run has finished, successfully or not
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lowercase status label
    #[inline]
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running(_) => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_short_hex() {
        for _ in 0..32 {
            let id = SessionId::generate();
            assert_eq!(id.as_str().len(), SESSION_ID_LEN);
            assert!(id.as_str().parse::<SessionId>().is_ok());
        }
    }

    #[test]
    fn malformed_ids_are_rejected() {
        for bad in ["", "ABCDEF12", "abc", "../../etc", "abcdefgh", "abcdef123"] {
            assert!(bad.parse::<SessionId>().is_err(), "{bad}");
        }
    }

    #[test]
    fn session_id_serde_validates() {
        let id: SessionId = serde_json::from_str("\"0a1b2c3d\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"0a1b2c3d\"");
        assert!(serde_json::from_str::<SessionId>("\"nope\"").is_err());
    }

    #[test]
    fn step_results_keep_insertion_order() {
        let mut results = StepResults::new();
        results.insert(StepId::Analyze, "a".into());
        results.insert(StepId::Summarize, "s".into());
        let json = serde_json::to_string(&results).unwrap();
        assert_eq!(json, r#"{"analyze":"a","summarize":"s"}"#);
    }

    #[test]
    fn terminal_states() {
        assert!(!RunState::Pending.is_terminal());
        assert!(!RunState::Running(2).is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
    }
}
