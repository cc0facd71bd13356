//! Crew Protocol - wire types for the sandboxed tool service
//!
//! Shared between the tool service (`crew-sandbox`) and its typed client
//! (`crew-tools`):
//! - Tool names and their argument schemas
//! - Request/response bodies for every endpoint
//! - The structured report produced by the static-analysis scanner
//!
//! Every body is JSON. Error responses carry an [`ErrorBody`].

#![warn(unreachable_pub)]

pub mod scan;
pub mod tool;
pub mod wire;

pub use scan::{Finding, ScanReport, Severity};
pub use tool::{ToolName, UnknownTool};
pub use wire::{
    ErrorBody, ExecRequest, ExecResponse, HealthResponse, ListRequest, ListResponse, ReadRequest,
    ReadResponse, ScanRequest, WriteRequest, WriteResponse,
};

/// Default path for operations that accept an optional path
pub const CURRENT_DIR: &str = ".";
