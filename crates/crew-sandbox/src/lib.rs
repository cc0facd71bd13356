//! Crew Sandbox - the sandboxed tool service
//!
//! Exposes file read/write/list, shell command execution and static-analysis
//! scans, all confined to a single root directory:
//! - Every path is resolved against the root before any I/O happens
//! - `..`, absolute paths and symlinks that leave the root are rejected
//! - Commands run in their own process group under a hard timeout
//! - Captured output is bounded in memory and truncated on failure
//!
//! # Example
//!
//! ```rust,ignore
//! use crew_sandbox::{SandboxConfig, ToolService};
//!
//! # async fn example() -> Result<(), crew_sandbox::SandboxError> {
//! let service = ToolService::new(SandboxConfig::new("/code"))?;
//! service.write("ab12cd34/snippet.py", "print('hi')\n").await?;
//! let listing = service.list("ab12cd34").await?;
//! assert_eq!(listing, vec!["snippet.py".to_string()]);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod exec;
pub mod root;
pub mod scan;
pub mod server;
pub mod service;

pub use config::SandboxConfig;
pub use error::SandboxError;
pub use exec::CommandOutput;
pub use root::SandboxRoot;
pub use scan::Scanner;
pub use server::{routes, serve};
pub use service::ToolService;
