//! JSON bodies of the submission interface

use chrono::{DateTime, Utc};
use crew_core::{RunReport, SessionId, SessionRecord, StepId, StepResults};
use serde::{Deserialize, Serialize};

/// Filename used when a submission does not name one
pub const DEFAULT_FILENAME: &str = "snippet.py";

fn default_filename() -> String {
    DEFAULT_FILENAME.to_string()
}

/// `POST /refactor`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactorRequest {
    /// Source code to work on
    pub code: String,
    /// Name of the file inside the session directory
    #[serde(default = "default_filename")]
    pub filename: String,
}

/// Which step failed and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepErrorBody {
    /// Failing step
    pub step: StepId,
    /// Rendered cause
    pub message: String,
}

/// Response of `POST /refactor`; completed steps appear as top-level keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefactorResponse {
    /// Session id
    pub session: SessionId,
    /// `completed` or `failed`
    pub status: String,
    /// Rendered execution log
    pub logs: String,
    /// Step outputs keyed by step id
    #[serde(flatten)]
    pub steps: StepResults,
    /// Present when a step failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepErrorBody>,
}

impl From<&RunReport> for RefactorResponse {
    fn from(report: &RunReport) -> Self {
        Self {
            session: report.session.clone(),
            status: report.state.label().to_string(),
            logs: report.render_log(),
            steps: report.results.clone(),
            error: report.failure.as_ref().map(|f| StepErrorBody {
                step: f.step,
                message: f.source.to_string(),
            }),
        }
    }
}

/// Response of `GET /sessions/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    /// Session id
    pub session: SessionId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Root-relative path of the submitted code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Step outputs keyed by step id
    #[serde(flatten)]
    pub steps: StepResults,
}

impl From<SessionRecord> for SessionView {
    fn from(record: SessionRecord) -> Self {
        Self {
            session: record.id,
            created_at: record.created_at,
            artifact: record.artifact,
            steps: record.results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filename_defaults() {
        let req: RefactorRequest = serde_json::from_value(json!({ "code": "x = 1" })).unwrap();
        assert_eq!(req.filename, "snippet.py");
    }

    #[test]
    fn steps_are_flattened() {
        let mut steps = StepResults::new();
        steps.insert(StepId::Summarize, "s".into());
        let resp = RefactorResponse {
            session: "ab12cd34".parse().unwrap(),
            status: "failed".into(),
            logs: String::new(),
            steps,
            error: Some(StepErrorBody {
                step: StepId::Analyze,
                message: "boom".into(),
            }),
        };

        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            value,
            json!({
                "session": "ab12cd34",
                "status": "failed",
                "logs": "",
                "summarize": "s",
                "error": { "step": "analyze", "message": "boom" }
            })
        );
    }

    #[test]
    fn session_view_carries_the_artifact() {
        let mut steps = StepResults::new();
        steps.insert(StepId::Summarize, "s".into());
        let view = SessionView {
            session: "ab12cd34".parse().unwrap(),
            created_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            artifact: Some("ab12cd34/snippet.py".into()),
            steps,
        };

        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["artifact"], "ab12cd34/snippet.py");
        assert_eq!(value["summarize"], "s");
        assert_eq!(serde_json::from_value::<SessionView>(value).unwrap(), view);
    }
}
