//! Tool dispatch seam between agents and the tool service
//!
//! - [`ToolCall`]: a validated request from an agent, bound to its session
//! - [`ToolInvoker`]: the async seam agents dispatch through
//! - [`HttpToolInvoker`]: the production invoker backed by [`ToolClient`]

use async_trait::async_trait;
use crew_protocol::{ExecRequest, ExecResponse, ScanReport, ToolName};
use crew_tools::{ToolClient, ToolInvocationError};
use serde_json::{Map, Value};
use std::path::{Component, Path};

/// Typed arguments of a tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolArgs {
    /// `read_file(path)`
    ReadFile {
        /// File to read
        path: String,
    },
    /// `write_file(path, content)`
    WriteFile {
        /// File to replace
        path: String,
        /// New content
        content: String,
    },
    /// `list_dir(path?)`
    ListDir {
        /// Directory; the session directory when absent
        path: Option<String>,
    },
    /// `run_tests(workdir?)`
    RunTests {
        /// Working directory; the session directory when absent
        workdir: Option<String>,
    },
    /// `security_scan(path?)`
    SecurityScan {
        /// Target; the session directory when absent
        path: Option<String>,
    },
}

impl ToolArgs {
    /// The path-like argument, when given
    fn path(&self) -> Option<&str> {
        match self {
            Self::ReadFile { path } | Self::WriteFile { path, .. } => Some(path.as_str()),
            Self::ListDir { path } | Self::SecurityScan { path } => path.as_deref(),
            Self::RunTests { workdir } => workdir.as_deref(),
        }
    }

    /// Parse and validate the argument object of `tool`
    ///
    /// # Errors
    /// A human-readable reason when the arguments do not fit the tool
    pub fn parse(tool: ToolName, arguments: &Map<String, Value>) -> Result<Self, String> {
        Ok(match tool {
            ToolName::ReadFile => Self::ReadFile {
                path: required(arguments, "path")?,
            },
            ToolName::WriteFile => Self::WriteFile {
                path: required(arguments, "path")?,
                content: required(arguments, "content")?,
            },
            ToolName::ListDir => Self::ListDir {
                path: optional(arguments, "path")?,
            },
            ToolName::RunTests => Self::RunTests {
                workdir: optional(arguments, "workdir")?,
            },
            ToolName::SecurityScan => Self::SecurityScan {
                path: optional(arguments, "path")?,
            },
        })
    }
}

fn optional(arguments: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(format!("`{key}` must be a string, got {other}")),
    }
}

fn required(arguments: &Map<String, Value>, key: &str) -> Result<String, String> {
    optional(arguments, key)?.ok_or_else(|| format!("missing required argument `{key}`"))
}

/// Check that a root-relative `path` stays inside `workspace`
///
/// The check is lexical: `.` and `..` are folded and the result must be the
/// workspace directory or lie below it. Absolute paths are refused.
///
/// # Errors
/// A human-readable reason naming the offending path
pub fn scoped_to(path: &str, workspace: &str) -> Result<(), String> {
    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(segment) => parts.push(segment.to_str().unwrap_or_default()),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(format!("`{path}` leaves the session workspace `{workspace}`"));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("`{path}` is absolute; use a path under `{workspace}/`"));
            }
        }
    }
    if parts.first() == Some(&workspace) {
        Ok(())
    } else {
        Err(format!("`{path}` is outside the session workspace `{workspace}`"))
    }
}

/// A tool request bound to the session workspace it originates from
///
/// Every path argument must lie inside the workspace, so an agent working
/// for one session cannot reach another session's files.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Tool to run
    pub tool: ToolName,
    /// Raw argument object
    pub arguments: Map<String, Value>,
    /// Root-relative session directory used for defaults
    pub workspace: String,
}

impl ToolCall {
    /// Validate a requested call
    ///
    /// # Errors
    /// A human-readable reason when the arguments are not an object or do
    /// not fit the tool
    pub fn new(tool: ToolName, arguments: Value, workspace: impl Into<String>) -> Result<Self, String> {
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(format!("arguments must be a JSON object, got {other}")),
        };
        let call = Self {
            tool,
            arguments,
            workspace: workspace.into(),
        };
        call.args()?;
        Ok(call)
    }

    /// Typed view of the arguments, checked against the workspace
    ///
    /// # Errors
    /// Same as [`ToolArgs::parse`], or a path outside the workspace
    pub fn args(&self) -> Result<ToolArgs, String> {
        let args = ToolArgs::parse(self.tool, &self.arguments)?;
        if let Some(path) = args.path() {
            scoped_to(path, &self.workspace)?;
        }
        Ok(args)
    }
}

/// Successful tool result
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// File content
    Content(String),
    /// Write acknowledgement
    Written {
        /// File that was replaced
        path: String,
    },
    /// Directory entries
    Listing(Vec<String>),
    /// Scanner findings
    Findings(ScanReport),
    /// Command output and exit code
    Command(ExecResponse),
}

impl ToolOutput {
    /// Text handed back to the model
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Content(text) => text.clone(),
            Self::Written { path } => format!("Wrote {path}"),
            Self::Listing(entries) if entries.is_empty() => "(empty directory)".to_string(),
            Self::Listing(entries) => entries.join("\n"),
            Self::Findings(report) => report.summary(),
            Self::Command(resp) if resp.succeeded() => resp.output.clone(),
            Self::Command(resp) => format!("exit code {}\n{}", resp.exit_code(), resp.output),
        }
    }
}

/// Performs tool calls on behalf of agents
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Perform one call
    async fn invoke(&self, call: ToolCall) -> Result<ToolOutput, ToolInvocationError>;
}

/// Invoker backed by the tool service over HTTP
#[derive(Debug, Clone)]
pub struct HttpToolInvoker {
    client: ToolClient,
    test_command: String,
    test_timeout_secs: Option<u64>,
}

impl HttpToolInvoker {
    /// Invoker running `test_command` for `run_tests`
    #[must_use]
    pub fn new(client: ToolClient, test_command: impl Into<String>) -> Self {
        Self {
            client,
            test_command: test_command.into(),
            test_timeout_secs: None,
        }
    }

    /// With a wall-clock limit for `run_tests`
    #[inline]
    #[must_use]
    pub fn with_test_timeout(mut self, secs: Option<u64>) -> Self {
        self.test_timeout_secs = secs;
        self
    }

    /// Underlying client
    #[inline]
    #[must_use]
    pub fn client(&self) -> &ToolClient {
        &self.client
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn invoke(&self, call: ToolCall) -> Result<ToolOutput, ToolInvocationError> {
        let args = call.args().map_err(|reason| {
            ToolInvocationError::new(
                call.tool.as_str(),
                crew_tools::ToolErrorCause::Decode(reason),
            )
        })?;
        let workspace = call.workspace;

        let result = match args {
            ToolArgs::ReadFile { path } => self.client.read(&path).await.map(ToolOutput::Content),
            ToolArgs::WriteFile { path, content } => self
                .client
                .write(&path, &content)
                .await
                .map(|()| ToolOutput::Written { path }),
            ToolArgs::ListDir { path } => self
                .client
                .list(path.as_deref().unwrap_or(&workspace))
                .await
                .map(ToolOutput::Listing),
            ToolArgs::RunTests { workdir } => {
                let mut request =
                    ExecRequest::new(&self.test_command).in_dir(workdir.unwrap_or(workspace));
                if let Some(secs) = self.test_timeout_secs {
                    request = request.with_timeout(secs);
                }
                self.client.execute(&request).await.map(ToolOutput::Command)
            }
            ToolArgs::SecurityScan { path } => self
                .client
                .scan(path.as_deref().unwrap_or(&workspace))
                .await
                .map(ToolOutput::Findings),
        };

        result.map_err(|e| e.for_tool(call.tool.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arguments_are_validated_per_tool() {
        assert!(ToolCall::new(ToolName::ReadFile, json!({ "path": "s/a.py" }), "s").is_ok());
        assert!(ToolCall::new(ToolName::ReadFile, json!({}), "s").is_err());
        assert!(ToolCall::new(ToolName::ReadFile, json!({ "path": 3 }), "s").is_err());
        assert!(ToolCall::new(ToolName::WriteFile, json!({ "path": "s/a.py" }), "s").is_err());
        assert!(ToolCall::new(ToolName::RunTests, json!(null), "s").is_ok());
        assert!(ToolCall::new(ToolName::SecurityScan, json!("."), "s").is_err());
    }

    #[test]
    fn paths_must_stay_in_the_workspace() {
        for ok in ["ab12cd34", "ab12cd34/snippet.py", "./ab12cd34/x/../y.py", "ab12cd34/"] {
            assert!(scoped_to(ok, "ab12cd34").is_ok(), "{ok}");
        }
        for bad in [
            "ffffffff/snippet.py",
            "ab12cd34/../ffffffff/snippet.py",
            "snippet.py",
            ".",
            "",
            "..",
            "/code/ab12cd34/snippet.py",
            "ab12cd345/x.py",
        ] {
            assert!(scoped_to(bad, "ab12cd34").is_err(), "{bad}");
        }
    }

    #[test]
    fn calls_into_other_sessions_are_rejected() {
        let foreign = json!({ "path": "ffffffff/snippet.py" });
        assert!(ToolCall::new(ToolName::ReadFile, foreign.clone(), "ab12cd34").is_err());
        assert!(ToolCall::new(ToolName::SecurityScan, foreign, "ab12cd34").is_err());
        assert!(ToolCall::new(ToolName::RunTests, json!({ "workdir": "ffffffff" }), "ab12cd34").is_err());
        assert!(ToolCall::new(
            ToolName::WriteFile,
            json!({ "path": "ab12cd34/../ffffffff/snippet.py", "content": "" }),
            "ab12cd34"
        )
        .is_err());

        let literal = ToolCall {
            tool: ToolName::ReadFile,
            arguments: json!({ "path": "ffffffff/snippet.py" }).as_object().cloned().unwrap(),
            workspace: "ab12cd34".into(),
        };
        assert!(literal.args().is_err());
    }

    #[test]
    fn optional_arguments_default_to_none() {
        let call = ToolCall::new(ToolName::RunTests, json!({}), "ab12cd34").unwrap();
        assert_eq!(call.args().unwrap(), ToolArgs::RunTests { workdir: None });
        assert_eq!(call.workspace, "ab12cd34");
    }

    #[test]
    fn outputs_render_for_the_model() {
        assert_eq!(ToolOutput::Listing(vec![]).render(), "(empty directory)");
        assert_eq!(
            ToolOutput::Listing(vec!["a.py".into(), "b.py".into()]).render(),
            "a.py\nb.py"
        );
        assert_eq!(
            ToolOutput::Written { path: "s/a.py".into() }.render(),
            "Wrote s/a.py"
        );
        let failed = ExecResponse {
            exit: Some(1),
            output: "1 failed".into(),
        };
        assert_eq!(ToolOutput::Command(failed).render(), "exit code 1\n1 failed");
    }
}
