//! Pipeline orchestrator
//!
//! Drives one submission end to end:
//! - Reserves a session and stores the artifact under `<session>/<filename>`
//! - Binds the roster to the artifact and runs the steps strictly in order
//! - Persists results after every step, so partial results survive failures
//! - Retries a step only for retryable tool errors, when configured to
//!
//! Run states move along an explicit transition table (see
//! [`allowed_transitions`]).

use crate::agent::StepContext;
use crate::config::CrewConfig;
use crate::error::{AgentError, CrewError, StepFailure};
use crate::log::{render_entries, ExecutionLog, LogEntry};
use crate::pipeline::{Pipeline, PipelineStep};
use crate::roster::Roster;
use crate::session::SessionStore;
use crate::tools::{ToolCall, ToolInvoker};
use crate::types::{RunState, SessionId, StepResults};
use crew_protocol::ToolName;
use serde_json::{Map, Value};
use std::sync::Arc;

const ACTOR: &str = "orchestrator";

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: RunState) -> Vec<RunState> {
    use RunState::{Completed, Failed, Pending, Running};
    match from {
        Pending => vec![Running(0)],
        Running(i) => vec![Running(i + 1), Completed, Failed],
        Completed | Failed => vec![],
    }
}

/// Check a transition against the table
///
/// # Errors
/// `IllegalTransition` when `to` is not reachable from `from`
pub fn validate_transition(from: RunState, to: RunState) -> Result<(), CrewError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(CrewError::IllegalTransition { from, to })
    }
}

/// Outcome of a run, successful or not
#[derive(Debug)]
pub struct RunReport {
    /// Session id
    pub session: SessionId,
    /// Root-relative artifact path
    pub artifact: String,
    /// Terminal state
    pub state: RunState,
    /// Outputs of the steps that completed
    pub results: StepResults,
    /// The failing step, when `state` is `Failed`
    pub failure: Option<StepFailure>,
    /// Execution log of the session
    pub log: Vec<LogEntry>,
}

impl RunReport {
    /// Whether every step completed
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Log rendered one entry per line
    #[must_use]
    pub fn render_log(&self) -> String {
        render_entries(&self.log)
    }
}

/// Runs pipelines against shared agents, tools and session storage
#[derive(Clone)]
pub struct Orchestrator {
    config: CrewConfig,
    roster: Roster,
    tools: Arc<dyn ToolInvoker>,
    sessions: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("roster", &self.roster)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator from its collaborators
    #[must_use]
    pub fn new(
        config: CrewConfig,
        roster: Roster,
        tools: Arc<dyn ToolInvoker>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config,
            roster,
            tools,
            sessions,
        }
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CrewConfig {
        &self.config
    }

    /// Session storage
    #[inline]
    #[must_use]
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Run a submission end to end
    ///
    /// A failing step is not an error of this call: it yields a report in
    /// the `Failed` state with the partial results.
    ///
    /// # Errors
    /// - `InvalidFilename` for a filename that is not one path component
    /// - `Session` when storage fails
    /// - `Artifact` when the code cannot be written to the workspace
    pub async fn submit(&self, code: &str, filename: &str) -> Result<RunReport, CrewError> {
        validate_filename(filename)?;

        let session = self.sessions.create().await?;
        let log = ExecutionLog::new();
        log.record(None, "session", "created", session.to_string());
        tracing::info!(%session, filename, bytes = code.len(), "submission accepted");

        let artifact = format!("{session}/{filename}");
        let mut arguments = Map::new();
        arguments.insert("path".into(), Value::String(artifact.clone()));
        arguments.insert("content".into(), Value::String(code.to_string()));
        let call = ToolCall {
            tool: ToolName::WriteFile,
            arguments,
            workspace: session.to_string(),
        };
        self.tools.invoke(call).await.map_err(|e| {
            tracing::error!(%session, error = %e, "failed to store artifact");
            CrewError::Artifact(e)
        })?;
        self.sessions.attach_artifact(&session, &artifact).await?;
        log.record(None, "session", "artifact_stored", artifact.clone());

        let pipeline = Pipeline::build(&self.roster, artifact);
        self.run(session, &pipeline, &log).await
    }

    /// Run a built pipeline for an existing session
    ///
    /// # Errors
    /// `Session` when storage fails, `IllegalTransition` on a broken table
    pub async fn run(
        &self,
        session: SessionId,
        pipeline: &Pipeline,
        log: &ExecutionLog,
    ) -> Result<RunReport, CrewError> {
        let workspace = session.to_string();
        let mut state = RunState::Pending;
        let mut results = StepResults::new();
        let mut context = String::new();
        let mut failure = None;

        for (index, step) in pipeline.steps().iter().enumerate() {
            advance(&mut state, RunState::Running(index), log)?;
            let ctx = StepContext {
                step: step.id,
                workspace: &workspace,
                tools: self.tools.as_ref(),
                log,
            };

            match self.run_step(step, &context, ctx).await {
                Ok(output) => {
                    if !context.is_empty() {
                        context.push_str("\n\n");
                    }
                    context.push_str(&output);
                    results.insert(step.id, output);
                    self.sessions.save(&session, &results).await?;
                    log.record(Some(step.id), ACTOR, "step_completed", step.agent.role());
                }
                Err(source) => {
                    tracing::error!(%session, step = %step.id, error = %source, "step failed");
                    log.record(Some(step.id), ACTOR, "step_failed", source.to_string());
                    failure = Some(StepFailure {
                        step: step.id,
                        source,
                    });
                    break;
                }
            }
        }

        if failure.is_some() {
            advance(&mut state, RunState::Failed, log)?;
            self.sessions.save(&session, &results).await?;
        } else {
            advance(&mut state, RunState::Completed, log)?;
        }
        tracing::info!(%session, state = state.label(), steps = results.len(), "run finished");

        Ok(RunReport {
            session,
            artifact: pipeline.artifact().to_string(),
            state,
            results,
            failure,
            log: log.entries(),
        })
    }

    async fn run_step(
        &self,
        step: &PipelineStep,
        context: &str,
        ctx: StepContext<'_>,
    ) -> Result<String, AgentError> {
        let mut attempt = 0;
        loop {
            match step.agent.perform(&step.task, context, ctx).await {
                Ok(output) => return Ok(output),
                Err(e) if e.is_retryable() && attempt < self.config.step_retries => {
                    attempt += 1;
                    ctx.log.record(
                        Some(step.id),
                        ACTOR,
                        "step_retry",
                        format!("attempt {} after: {e}", attempt + 1),
                    );
                    tracing::warn!(step = %step.id, attempt, error = %e, "retrying step");
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn advance(state: &mut RunState, to: RunState, log: &ExecutionLog) -> Result<(), CrewError> {
    validate_transition(*state, to)?;
    log.record(None, ACTOR, "transition", format!("{:?} -> {to:?}", *state));
    *state = to;
    Ok(())
}

/// Accept only a single, ordinary path component
///
/// # Errors
/// `InvalidFilename` otherwise
pub fn validate_filename(filename: &str) -> Result<(), CrewError> {
    let ok = !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains(['/', '\\', '\0']);
    if ok {
        Ok(())
    } else {
        Err(CrewError::InvalidFilename(filename.to_string()))
    }
}
