//! Per-session execution log
//!
//! Every agent transition, tool dispatch and step outcome is appended here
//! and also emitted as a `tracing` event. The rendered log is returned to
//! the submitter alongside the step results.

use crate::types::StepId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// One recorded event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the event happened
    pub at: DateTime<Utc>,
    /// Step the event belongs to, if any
    pub step: Option<StepId>,
    /// Who acted: an agent role, `orchestrator` or `session`
    pub actor: String,
    /// Short event name
    pub action: String,
    /// Free-form detail
    pub detail: String,
}

/// Append-only log shared by the components of one run
#[derive(Debug, Default)]
pub struct ExecutionLog {
    inner: Mutex<Vec<LogEntry>>,
}

impl ExecutionLog {
    /// Create an empty log
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn record(
        &self,
        step: Option<StepId>,
        actor: &str,
        action: &str,
        detail: impl Into<String>,
    ) {
        let entry = LogEntry {
            at: Utc::now(),
            step,
            actor: actor.to_string(),
            action: action.to_string(),
            detail: detail.into(),
        };
        tracing::debug!(
            step = entry.step.map(StepId::as_str),
            actor = %entry.actor,
            action = %entry.action,
            "{}",
            entry.detail
        );
        self.inner.lock().push(entry);
    }

    /// Snapshot of all entries
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.lock().clone()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Human-readable rendering, one line per entry
    #[must_use]
    pub fn render(&self) -> String {
        render_entries(&self.inner.lock())
    }
}

/// Render entries one per line
#[must_use]
pub fn render_entries(entries: &[LogEntry]) -> String {
    let mut out = String::new();
    for e in entries {
        let step = e.step.map_or("-", StepId::as_str);
        let _ = writeln!(
            out,
            "{} [{step}] {}: {} {}",
            e.at.format("%H:%M:%S%.3f"),
            e.actor,
            e.action,
            e.detail
        );
    }
    out
}
