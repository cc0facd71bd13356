//! Crew Tools - client side of the sandboxed tool service
//!
//! [`ToolClient`] speaks the JSON protocol of `crew-sandbox` over HTTP and
//! turns every failure into a [`ToolInvocationError`]:
//! - A failure to connect is retryable; a request that timed out after it was
//!   sent is not, since the service may already have acted on it
//! - Service errors keep the service's classification and are never retryable
//! - The client itself never retries; that decision belongs to the caller

#![warn(unreachable_pub)]

pub mod client;
pub mod error;

pub use client::{ToolClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::{ToolErrorCause, ToolInvocationError};
