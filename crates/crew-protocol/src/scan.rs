//! Static-analysis scan report
//!
//! Mirrors the JSON report format of Bandit-compatible scanners. Only the
//! `results` array is mandatory; a report without it is treated as
//! unparseable by the service.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

/// Severity or confidence rating of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Low
    Low,
    /// Medium
    Medium,
    /// High
    High,
    /// Rating missing or not recognised
    #[serde(other)]
    Undefined,
}

/// A single issue reported by the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// File the issue was found in
    pub filename: String,
    /// First line of the issue
    pub line_number: u64,
    /// Scanner rule id, e.g. `B101`
    pub test_id: String,
    /// Scanner rule name
    pub test_name: String,
    /// Issue severity
    pub issue_severity: Severity,
    /// Scanner confidence
    pub issue_confidence: Severity,
    /// Description of the issue
    pub issue_text: String,
    /// Lines covered by the issue
    #[serde(default)]
    pub line_range: Vec<u64>,
    /// Offending source excerpt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Link to rule documentation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub more_info: Option<String>,
}

/// Parsed scanner report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Findings
    pub results: Vec<Finding>,
    /// Per-file errors the scanner reported
    #[serde(default)]
    pub errors: Vec<Value>,
    /// Scanner metrics, passed through untouched
    #[serde(default)]
    pub metrics: Value,
    /// Report timestamp as written by the scanner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

impl ScanReport {
    /// Parse a report from raw bytes
    ///
    /// # Errors
    /// Returns the decoding error if the bytes are not a report
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Number of findings at the given severity
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.results
            .iter()
            .filter(|f| f.issue_severity == severity)
            .count()
    }

    /// Plain-text rendering for agents
    #[must_use]
    pub fn summary(&self) -> String {
        if self.results.is_empty() {
            return "No issues found.".to_string();
        }

        let mut out = format!(
            "{} issue(s) found (high: {}, medium: {}, low: {})",
            self.results.len(),
            self.count(Severity::High),
            self.count(Severity::Medium),
            self.count(Severity::Low),
        );
        for finding in &self.results {
            let _ = write!(
                out,
                "\n- {}:{} [{} {}] severity={:?} confidence={:?}: {}",
                finding.filename,
                finding.line_number,
                finding.test_id,
                finding.test_name,
                finding.issue_severity,
                finding.issue_confidence,
                finding.issue_text,
            );
        }
        out
    }
}
