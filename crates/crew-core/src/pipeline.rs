//! The fixed four-step pipeline
//!
//! Task descriptions are produced by typed builders from the artifact path
//! so every step names the exact file it works on.

use crate::agent::{Agent, TaskSpec};
use crate::roster::Roster;
use crate::types::StepId;
use crew_protocol::ToolName;
use std::sync::Arc;

/// Typed description builder for each step
#[derive(Debug, Clone, Copy)]
pub struct TaskBuilder<'a> {
    artifact: &'a str,
}

impl<'a> TaskBuilder<'a> {
    /// Builder for the artifact at root-relative `artifact`
    #[inline]
    #[must_use]
    pub fn new(artifact: &'a str) -> Self {
        Self { artifact }
    }

    /// Task for `step`
    #[must_use]
    pub fn build(self, step: StepId) -> TaskSpec {
        match step {
            StepId::Summarize => self.summarize(),
            StepId::Analyze => self.analyze(),
            StepId::Plan => self.plan(),
            StepId::Rewrite => self.rewrite(),
        }
    }

    /// Summarize the artifact
    #[must_use]
    pub fn summarize(self) -> TaskSpec {
        TaskSpec {
            description: format!("Summarise the file at **{}**.", self.artifact),
            expected_output: "Concise paragraph summarising purpose and structure.".into(),
        }
    }

    /// Find problems in the artifact
    #[must_use]
    pub fn analyze(self) -> TaskSpec {
        TaskSpec {
            description: format!(
                "List every bug, failing test or security issue in the code at **{}**.",
                self.artifact
            ),
            expected_output: "Bullet list with line numbers and severity.".into(),
        }
    }

    /// Plan the fixes
    #[must_use]
    pub fn plan(self) -> TaskSpec {
        TaskSpec {
            description: format!(
                "Propose precise code changes or refactors to **{}** that resolve all issues.",
                self.artifact
            ),
            expected_output: "Step-by-step refactor plan.".into(),
        }
    }

    /// Apply the plan
    #[must_use]
    pub fn rewrite(self) -> TaskSpec {
        TaskSpec {
            description: format!(
                "Apply the approved improvements to **{}**, overwrite the file, then run the \
                 tests. Ensure all tests pass and report the diff.",
                self.artifact
            ),
            expected_output: "Patch/diff of the refactored file plus test summary.".into(),
        }
    }
}

/// One immutable step of a built pipeline
#[derive(Debug, Clone)]
pub struct PipelineStep {
    /// Step id
    pub id: StepId,
    /// Agent performing the step
    pub agent: Arc<Agent>,
    /// Task handed to the agent
    pub task: TaskSpec,
}

impl PipelineStep {
    /// Tools the step may use
    #[inline]
    #[must_use]
    pub fn tools(&self) -> &[ToolName] {
        self.agent.tools()
    }
}

/// The ordered steps for one artifact
#[derive(Debug, Clone)]
pub struct Pipeline {
    artifact: String,
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    /// Bind the roster to the artifact at root-relative `artifact`
    #[must_use]
    pub fn build(roster: &Roster, artifact: impl Into<String>) -> Self {
        let artifact = artifact.into();
        let builder = TaskBuilder::new(&artifact);
        let steps = StepId::ALL
            .iter()
            .map(|&id| PipelineStep {
                id,
                agent: Arc::clone(roster.agent_for(id)),
                task: builder.build(id),
            })
            .collect();
        Self { artifact, steps }
    }

    /// Artifact the pipeline works on
    #[inline]
    #[must_use]
    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// Steps in execution order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockCompletionBackend;

    #[test]
    fn steps_follow_the_fixed_order() {
        let roster = Roster::standard(Arc::new(MockCompletionBackend::new()), 4);
        let pipeline = Pipeline::build(&roster, "ab12cd34/snippet.py");

        let ids: Vec<_> = pipeline.steps().iter().map(|s| s.id).collect();
        assert_eq!(ids, StepId::ALL.to_vec());
        assert_eq!(pipeline.artifact(), "ab12cd34/snippet.py");
        assert!(pipeline.steps()[2].tools().is_empty());
    }

    #[test]
    fn descriptions_name_the_artifact() {
        let builder = TaskBuilder::new("ab12cd34/snippet.py");
        for step in StepId::ALL {
            assert!(
                builder.build(step).description.contains("ab12cd34/snippet.py"),
                "{step}"
            );
        }
    }
}
