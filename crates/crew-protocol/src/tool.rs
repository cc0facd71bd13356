//! Tool names
//!
//! The closed set of capabilities an agent may be granted. Names are the
//! identifiers the completion backend uses when it requests a tool.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// A tool capability exposed to agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Read a file from the workspace
    ReadFile,
    /// Write (overwrite) a file in the workspace
    WriteFile,
    /// List a directory in the workspace
    ListDir,
    /// Run the configured test command
    RunTests,
    /// Run the static-analysis scanner
    SecurityScan,
}

impl ToolName {
    /// Every tool, in declaration order
    pub const ALL: [ToolName; 5] = [
        ToolName::ReadFile,
        ToolName::WriteFile,
        ToolName::ListDir,
        ToolName::RunTests,
        ToolName::SecurityScan,
    ];

    /// Identifier used on the wire and by the completion backend
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::ReadFile => "read_file",
            ToolName::WriteFile => "write_file",
            ToolName::ListDir => "list_dir",
            ToolName::RunTests => "run_tests",
            ToolName::SecurityScan => "security_scan",
        }
    }

    /// Tool service endpoint serving this tool
    #[inline]
    #[must_use]
    pub fn endpoint(self) -> &'static str {
        match self {
            ToolName::ReadFile => "read",
            ToolName::WriteFile => "write",
            ToolName::ListDir => "list",
            ToolName::RunTests => "exec",
            ToolName::SecurityScan => "scan",
        }
    }

    /// Human-readable description shown to the model
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            ToolName::ReadFile => "Read a file from the shared workspace",
            ToolName::WriteFile => "Write content to a file in the workspace, replacing it",
            ToolName::ListDir => "List the entries of a directory in the workspace",
            ToolName::RunTests => "Run the test suite in a workdir and return its output",
            ToolName::SecurityScan => "Run a static security scan over a path",
        }
    }

    /// JSON schema of the tool's arguments
    #[must_use]
    pub fn parameters(self) -> Value {
        match self {
            ToolName::ReadFile => json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Workspace-relative file path" }
                },
                "required": ["path"]
            }),
            ToolName::WriteFile => json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Workspace-relative file path" },
                    "content": { "type": "string", "description": "Full new file content" }
                },
                "required": ["path", "content"]
            }),
            ToolName::ListDir => json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Workspace-relative directory" }
                }
            }),
            ToolName::RunTests => json!({
                "type": "object",
                "properties": {
                    "workdir": { "type": "string", "description": "Workspace-relative directory" }
                }
            }),
            ToolName::SecurityScan => json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Workspace-relative file or directory" }
                }
            }),
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name does not match any known tool
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tool: {0}")]
pub struct UnknownTool(pub String);

impl FromStr for ToolName {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for tool in ToolName::ALL {
            assert_eq!(tool.as_str().parse::<ToolName>().unwrap(), tool);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "delete_everything".parse::<ToolName>().unwrap_err();
        assert_eq!(err, UnknownTool("delete_everything".to_string()));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&ToolName::SecurityScan).unwrap();
        assert_eq!(json, "\"security_scan\"");
    }

    #[test]
    fn schemas_are_objects() {
        for tool in ToolName::ALL {
            assert_eq!(tool.parameters()["type"], "object");
        }
    }
}
