//! Crew Core - agents, pipeline orchestration and session storage
//!
//! Runs a fixed four-step pipeline (summarize, analyze, plan, rewrite) over
//! one submitted source file:
//! - [`Agent`]: a role with a permitted tool set and a bounded tool loop
//! - [`CompletionBackend`]: the language-model seam ([`OllamaBackend`])
//! - [`ToolInvoker`]: the tool seam ([`HttpToolInvoker`])
//! - [`Orchestrator`]: sequential execution with partial-result persistence
//! - [`SessionStore`]: in-memory or file-backed result storage
//!
//! # Example
//!
//! ```rust,ignore
//! use crew_core::{CrewConfig, Orchestrator};
//!
//! let report = orchestrator.submit("def add(a, b): return a + b\n", "snippet.py").await?;
//! println!("{}", report.render_log());
//! ```

#![warn(unreachable_pub)]

pub mod agent;
pub mod backend;
pub mod config;
pub mod error;
pub mod log;
pub mod orchestrator;
pub mod pipeline;
pub mod roster;
pub mod session;
pub mod tools;
pub mod types;

pub use agent::{Agent, AgentState, StepContext, TaskSpec};
pub use backend::{Completion, CompletionBackend, CompletionRequest, Message, OllamaBackend, Role};
pub use config::CrewConfig;
pub use error::{AgentError, BackendError, CrewError, SessionError, StepFailure};
pub use log::{ExecutionLog, LogEntry};
pub use orchestrator::{Orchestrator, RunReport};
pub use pipeline::{Pipeline, PipelineStep, TaskBuilder};
pub use roster::Roster;
pub use session::{FileSessionStore, InMemorySessionStore, SessionRecord, SessionStore};
pub use tools::{HttpToolInvoker, ToolArgs, ToolCall, ToolInvoker, ToolOutput};
pub use types::{RunState, SessionId, StepId, StepResults};
