//! Testing utilities for the crew workspace
//!
//! Shared fixtures: a scripted completion backend, an in-memory tool
//! invoker and a live tool service on an ephemeral port.

#![allow(missing_docs)]

use async_trait::async_trait;
use crew_core::{
    BackendError, Completion, CompletionBackend, CompletionRequest, CrewConfig,
    InMemorySessionStore, Orchestrator, Roster, ToolArgs, ToolCall, ToolInvoker, ToolOutput,
};
use crew_protocol::{ExecResponse, ScanReport, ToolName};
use crew_sandbox::{SandboxConfig, ToolService};
use crew_tools::{ToolClient, ToolErrorCause, ToolInvocationError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// Completion backend answering from per-role scripts
///
/// The role is read from the system prompt. A role with an exhausted (or
/// missing) script answers `"<role>: done"`.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, VecDeque<Completion>>>,
    requests: Mutex<Vec<(String, CompletionRequest)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue completions for `role`
    pub fn script(self, role: &str, completions: impl IntoIterator<Item = Completion>) -> Self {
        self.scripts
            .lock()
            .entry(role.to_string())
            .or_default()
            .extend(completions);
        self
    }

    /// Every request received, with the role that sent it
    pub fn requests(&self) -> Vec<(String, CompletionRequest)> {
        self.requests.lock().clone()
    }

    /// Roles in the order they first asked for a completion
    pub fn roles_seen(&self) -> Vec<String> {
        let mut roles: Vec<String> = Vec::new();
        for (role, _) in self.requests.lock().iter() {
            if !roles.contains(role) {
                roles.push(role.clone());
            }
        }
        roles
    }
}

fn role_of(request: &CompletionRequest) -> String {
    request
        .messages
        .first()
        .and_then(|m| m.content.strip_prefix("You are "))
        .and_then(|rest| rest.split_once(".\n"))
        .map(|(role, _)| role.to_string())
        .unwrap_or_default()
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, BackendError> {
        let role = role_of(&request);
        self.requests.lock().push((role.clone(), request));
        let next = self
            .scripts
            .lock()
            .get_mut(&role)
            .and_then(VecDeque::pop_front);
        Ok(next.unwrap_or_else(|| Completion::FinalAnswer(format!("{role}: done"))))
    }
}

/// Shorthand for a tool request
pub fn tool_request(name: &str, arguments: Value) -> Completion {
    Completion::ToolRequest {
        name: name.to_string(),
        arguments,
    }
}

/// Shorthand for a final answer
pub fn answer(text: &str) -> Completion {
    Completion::FinalAnswer(text.to_string())
}

/// Tool invoker over an in-memory file map
#[derive(Debug)]
pub struct MemoryToolInvoker {
    files: Mutex<BTreeMap<String, String>>,
    calls: Mutex<Vec<ToolCall>>,
    failures: Mutex<HashMap<ToolName, VecDeque<ToolInvocationError>>>,
    test_result: Mutex<ExecResponse>,
}

impl Default for MemoryToolInvoker {
    fn default() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            test_result: Mutex::new(ExecResponse {
                exit: None,
                output: "1 passed".to_string(),
            }),
        }
    }
}

impl MemoryToolInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next calls of `tool` fail with `error`, once per queued error
    pub fn fail_with(&self, tool: ToolName, error: ToolInvocationError) {
        self.failures.lock().entry(tool).or_default().push_back(error);
    }

    /// Result returned by `run_tests`
    pub fn set_test_result(&self, result: ExecResponse) {
        *self.test_result.lock() = result;
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().get(path).cloned()
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, tool: ToolName) -> usize {
        self.calls.lock().iter().filter(|c| c.tool == tool).count()
    }
}

/// A retryable transport failure
pub fn connect_error(tool: ToolName) -> ToolInvocationError {
    ToolInvocationError::new(tool.as_str(), ToolErrorCause::Connect("connection refused".into()))
}

#[async_trait]
impl ToolInvoker for MemoryToolInvoker {
    async fn invoke(&self, call: ToolCall) -> Result<ToolOutput, ToolInvocationError> {
        self.calls.lock().push(call.clone());
        if let Some(err) = self
            .failures
            .lock()
            .get_mut(&call.tool)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        let not_found = |path: &str| {
            ToolInvocationError::new(call.tool.as_str(), ToolErrorCause::NotFound(path.to_string()))
        };
        let args = call.args().map_err(|reason| {
            ToolInvocationError::new(call.tool.as_str(), ToolErrorCause::Decode(reason))
        })?;

        match args {
            ToolArgs::ReadFile { path } => self
                .file(&path)
                .map(ToolOutput::Content)
                .ok_or_else(|| not_found(&path)),
            ToolArgs::WriteFile { path, content } => {
                self.files.lock().insert(path.clone(), content);
                Ok(ToolOutput::Written { path })
            }
            ToolArgs::ListDir { path } => {
                let dir = path.unwrap_or_else(|| call.workspace.clone());
                let prefix = format!("{}/", dir.trim_end_matches('/'));
                let entries: Vec<String> = self
                    .files
                    .lock()
                    .keys()
                    .filter_map(|k| k.strip_prefix(&prefix))
                    .filter_map(|rest| rest.split('/').next())
                    .map(str::to_string)
                    .collect::<std::collections::BTreeSet<_>>()
                    .into_iter()
                    .collect();
                Ok(ToolOutput::Listing(entries))
            }
            ToolArgs::RunTests { .. } => Ok(ToolOutput::Command(self.test_result.lock().clone())),
            ToolArgs::SecurityScan { .. } => Ok(ToolOutput::Findings(ScanReport::default())),
        }
    }
}

/// Orchestrator over the given backend and tools with an in-memory store
pub fn orchestrator(
    config: CrewConfig,
    backend: Arc<dyn CompletionBackend>,
    tools: Arc<dyn ToolInvoker>,
) -> (Orchestrator, Arc<InMemorySessionStore>) {
    let store = Arc::new(InMemorySessionStore::new());
    let roster = Roster::standard(backend, config.max_iterations);
    let orchestrator = Orchestrator::new(config, roster, tools, store.clone());
    (orchestrator, store)
}

/// A tool service on an ephemeral port over a temporary root
pub struct ToolServer {
    pub dir: tempfile::TempDir,
    pub service: ToolService,
    pub client: ToolClient,
}

impl ToolServer {
    /// Start with the default sandbox configuration
    pub fn start() -> Self {
        Self::start_with(|config| config)
    }

    /// Start with an adjusted sandbox configuration
    pub fn start_with(configure: impl FnOnce(SandboxConfig) -> SandboxConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = configure(SandboxConfig::new(dir.path().join("code")));
        let service = ToolService::new(config).unwrap();
        let (addr, server) =
            warp::serve(crew_sandbox::routes(service.clone())).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        Self {
            dir,
            service,
            client: ToolClient::new(format!("http://{addr}")),
        }
    }
}
