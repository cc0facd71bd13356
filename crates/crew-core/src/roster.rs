//! The four standing agents of the crew
//!
//! Agents are built once per process and shared by every session through
//! `Arc`; they hold no per-session state.

use crate::agent::Agent;
use crate::backend::CompletionBackend;
use crate::types::StepId;
use crew_protocol::ToolName;
use std::sync::Arc;

/// Role of the summarizing agent
pub const SUMMARIZER_ROLE: &str = "Code Summarizer";
/// Role of the analyzing agent
pub const ANALYZER_ROLE: &str = "Bug & Vulnerability Analyzer";
/// Role of the planning agent
pub const STRATEGIST_ROLE: &str = "Improvement Strategist";
/// Role of the rewriting agent
pub const REWRITER_ROLE: &str = "Code Rewriter";

/// One shared agent per pipeline step
#[derive(Debug, Clone)]
pub struct Roster {
    summarizer: Arc<Agent>,
    analyzer: Arc<Agent>,
    strategist: Arc<Agent>,
    rewriter: Arc<Agent>,
}

impl Roster {
    /// The standard crew on one backend
    #[must_use]
    pub fn standard(backend: Arc<dyn CompletionBackend>, max_iterations: usize) -> Self {
        let summarizer = Agent::new(
            SUMMARIZER_ROLE,
            "Summarise behaviour and structure of the supplied code.",
            "A meticulous software archeologist who explains code succinctly.",
            Arc::clone(&backend),
        )
        .with_tools([ToolName::ReadFile]);

        let analyzer = Agent::new(
            ANALYZER_ROLE,
            "Discover logic bugs, failing tests and security issues.",
            "A veteran QA/security engineer with an eye for edge-cases.",
            Arc::clone(&backend),
        )
        .with_tools([ToolName::ReadFile, ToolName::RunTests, ToolName::SecurityScan]);

        let strategist = Agent::new(
            STRATEGIST_ROLE,
            "Propose refactorings that resolve all discovered issues.",
            "A senior architect who provides clear, actionable refactor plans.",
            Arc::clone(&backend),
        );

        let rewriter = Agent::new(
            REWRITER_ROLE,
            "Implement the improvements and make sure tests succeed.",
            "A disciplined developer who applies fixes and ensures tests pass.",
            backend,
        )
        .with_tools([ToolName::ReadFile, ToolName::WriteFile, ToolName::RunTests]);

        Self::from_agents([summarizer, analyzer, strategist, rewriter].map(|agent| {
            Arc::new(agent.with_max_iterations(max_iterations))
        }))
    }

    /// Roster from explicit agents, in step order
    #[must_use]
    pub fn from_agents([summarizer, analyzer, strategist, rewriter]: [Arc<Agent>; 4]) -> Self {
        Self {
            summarizer,
            analyzer,
            strategist,
            rewriter,
        }
    }

    /// Agent responsible for `step`
    #[must_use]
    pub fn agent_for(&self, step: StepId) -> &Arc<Agent> {
        match step {
            StepId::Summarize => &self.summarizer,
            StepId::Analyze => &self.analyzer,
            StepId::Plan => &self.strategist,
            StepId::Rewrite => &self.rewriter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockCompletionBackend;

    #[test]
    fn permitted_tools_per_role() {
        let roster = Roster::standard(Arc::new(MockCompletionBackend::new()), 5);

        assert_eq!(roster.agent_for(StepId::Summarize).tools(), &[ToolName::ReadFile]);
        assert_eq!(
            roster.agent_for(StepId::Analyze).tools(),
            &[ToolName::ReadFile, ToolName::RunTests, ToolName::SecurityScan]
        );
        assert!(roster.agent_for(StepId::Plan).tools().is_empty());
        assert_eq!(
            roster.agent_for(StepId::Rewrite).tools(),
            &[ToolName::ReadFile, ToolName::WriteFile, ToolName::RunTests]
        );
        assert!(StepId::ALL
            .iter()
            .all(|step| roster.agent_for(*step).max_iterations() == 5));
    }

    #[test]
    fn only_the_rewriter_may_write() {
        let roster = Roster::standard(Arc::new(MockCompletionBackend::new()), 5);
        let writers: Vec<_> = StepId::ALL
            .iter()
            .filter(|step| roster.agent_for(**step).permits(ToolName::WriteFile))
            .collect();
        assert_eq!(writers, vec![&StepId::Rewrite]);
    }
}
