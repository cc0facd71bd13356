//! Agents: role-bound tool loops over the completion backend
//!
//! An agent is immutable and shared across sessions. Performing a task runs
//! a small state machine:
//! - `Idle`: build the prompt and ask the backend
//! - `Acting { iteration }`: a tool was requested, checked against the
//!   permitted set, dispatched, and its result fed back
//!
//! The loop ends on a final answer, on the first failure, or when the
//! iteration bound is exceeded.

use crate::backend::{Completion, CompletionBackend, CompletionRequest, Message};
use crate::error::AgentError;
use crate::log::ExecutionLog;
use crate::tools::{ToolCall, ToolInvoker};
use crate::types::StepId;
use crew_protocol::ToolName;
use std::fmt::Write as _;
use std::sync::Arc;

/// Default bound on tool requests per task
pub const DEFAULT_MAX_ITERATIONS: usize = 8;

/// Loop state of an agent performing one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Waiting for the first completion
    Idle,
    /// Tool requests served so far
    Acting {
        /// Number of dispatched tool calls
        iteration: usize,
    },
}

impl AgentState {
    /// Tool calls dispatched so far
    #[inline]
    #[must_use]
    pub fn iterations(self) -> usize {
        match self {
            Self::Idle => 0,
            Self::Acting { iteration } => iteration,
        }
    }
}

/// What an agent is asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Instructions
    pub description: String,
    /// Shape of the expected answer
    pub expected_output: String,
}

/// Everything an agent needs from the session it works for
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    /// Step being performed
    pub step: StepId,
    /// Root-relative session directory
    pub workspace: &'a str,
    /// Dispatch target for tool calls
    pub tools: &'a dyn ToolInvoker,
    /// Session log
    pub log: &'a ExecutionLog,
}

/// A role-bound agent
#[derive(Clone)]
pub struct Agent {
    role: String,
    goal: String,
    backstory: String,
    tools: Vec<ToolName>,
    backend: Arc<dyn CompletionBackend>,
    max_iterations: usize,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("role", &self.role)
            .field("tools", &self.tools)
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Agent without tools
    #[must_use]
    pub fn new(
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
            tools: Vec::new(),
            backend,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// With permitted tools, in advertised order
    #[inline]
    #[must_use]
    pub fn with_tools(mut self, tools: impl IntoIterator<Item = ToolName>) -> Self {
        self.tools = tools.into_iter().collect();
        self
    }

    /// With tool-loop bound
    #[inline]
    #[must_use]
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Role name
    #[inline]
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Goal statement
    #[inline]
    #[must_use]
    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Permitted tools
    #[inline]
    #[must_use]
    pub fn tools(&self) -> &[ToolName] {
        &self.tools
    }

    /// Tool-loop bound
    #[inline]
    #[must_use]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Whether `tool` is in the permitted set
    #[inline]
    #[must_use]
    pub fn permits(&self, tool: ToolName) -> bool {
        self.tools.contains(&tool)
    }

    /// Initial conversation for a task
    #[must_use]
    pub fn prompt(&self, task: &TaskSpec, context: &str) -> Vec<Message> {
        let mut system = format!(
            "You are {}.\n{}\n\nYour personal goal is: {}\n",
            self.role, self.backstory, self.goal
        );
        if self.tools.is_empty() {
            system.push_str("\nYou have no tools; answer from the information given.\n");
        } else {
            system.push_str("\nYou may use these tools:\n");
            for tool in &self.tools {
                let _ = writeln!(system, "- {}: {}", tool.as_str(), tool.description());
            }
        }

        let mut user = format!(
            "Current task: {}\n\nThis is the expected output: {}\n",
            task.description, task.expected_output
        );
        if !context.is_empty() {
            let _ = write!(user, "\nContext from previous steps:\n{context}\n");
        }

        vec![Message::system(system), Message::user(user)]
    }

    /// Perform a task and return the final answer
    ///
    /// # Errors
    /// - `UnauthorizedTool` when the backend asks for a tool outside the
    ///   permitted set (nothing is dispatched)
    /// - `InvalidToolArguments` for malformed arguments or a path outside
    ///   the session workspace (nothing is dispatched)
    /// - `AgentExhausted` when more than `max_iterations` tools are requested
    /// - `Backend` or `Tool` when a collaborator fails
    pub async fn perform(
        &self,
        task: &TaskSpec,
        context: &str,
        ctx: StepContext<'_>,
    ) -> Result<String, AgentError> {
        let step = Some(ctx.step);
        let mut messages = self.prompt(task, context);
        let mut state = AgentState::Idle;
        ctx.log.record(step, &self.role, "started", format!("{} tools permitted", self.tools.len()));
        tracing::info!(step = %ctx.step, agent = %self.role, "agent started");

        loop {
            let request = CompletionRequest {
                messages: messages.clone(),
                tools: self.tools.clone(),
            };
            let completion = match self.backend.complete(request).await {
                Ok(c) => c,
                Err(e) => {
                    ctx.log.record(step, &self.role, "backend_error", e.to_string());
                    tracing::warn!(step = %ctx.step, agent = %self.role, error = %e, "backend failed");
                    return Err(AgentError::Backend(e));
                }
            };

            let (name, arguments) = match completion {
                Completion::FinalAnswer(answer) => {
                    ctx.log.record(
                        step,
                        &self.role,
                        "final_answer",
                        format!("{} chars after {} tool calls", answer.len(), state.iterations()),
                    );
                    tracing::info!(step = %ctx.step, agent = %self.role, "agent finished");
                    return Ok(answer);
                }
                Completion::ToolRequest { name, arguments } => (name, arguments),
            };

            let iteration = state.iterations();
            if iteration >= self.max_iterations {
                ctx.log.record(step, &self.role, "exhausted", format!("requested `{name}`"));
                tracing::warn!(step = %ctx.step, agent = %self.role, "tool loop exhausted");
                return Err(AgentError::AgentExhausted {
                    agent: self.role.clone(),
                    max_iterations: self.max_iterations,
                });
            }

            let tool = match name.parse::<ToolName>() {
                Ok(tool) if self.permits(tool) => tool,
                _ => {
                    ctx.log.record(step, &self.role, "unauthorized_tool", name.clone());
                    tracing::warn!(step = %ctx.step, agent = %self.role, tool = %name, "unauthorized tool request");
                    return Err(AgentError::UnauthorizedTool {
                        agent: self.role.clone(),
                        tool: name,
                    });
                }
            };

            let call = ToolCall::new(tool, arguments.clone(), ctx.workspace).map_err(|reason| {
                ctx.log.record(step, &self.role, "invalid_arguments", reason.clone());
                AgentError::InvalidToolArguments { tool, reason }
            })?;

            ctx.log.record(step, &self.role, "tool_call", format!("{tool} {arguments}"));
            tracing::debug!(step = %ctx.step, agent = %self.role, %tool, "dispatching tool call");
            let output = match ctx.tools.invoke(call).await {
                Ok(output) => output,
                Err(e) => {
                    ctx.log.record(step, &self.role, "tool_error", e.to_string());
                    tracing::warn!(step = %ctx.step, agent = %self.role, error = %e, "tool call failed");
                    return Err(AgentError::Tool(e));
                }
            };
            let rendered = output.render();
            ctx.log.record(step, &self.role, "tool_result", format!("{tool}: {} chars", rendered.len()));

            messages.push(Message::tool_request(tool.as_str(), arguments));
            messages.push(Message::tool(rendered));
            state = AgentState::Acting {
                iteration: iteration + 1,
            };
        }
    }
}
