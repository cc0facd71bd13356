//! Crew API - submission interface of the refactoring crew
//!
//! - `POST /refactor`: run the pipeline over submitted code
//! - `GET /sessions/{id}`: stored step results of a session
//! - `GET /healthz`: liveness check
//!
//! The `crew` binary wires this together with the tool service and the
//! completion backend.

#![warn(unreachable_pub)]

pub mod server;
pub mod setup;
pub mod telemetry;
pub mod wire;

pub use server::{routes, serve};
pub use setup::build_orchestrator;
