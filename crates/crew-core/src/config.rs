//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Ollama endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
/// Default completion model
pub const DEFAULT_MODEL: &str = "codellama:7b-instruct-q4_0";
/// Default tool service endpoint
pub const DEFAULT_TOOLS_URL: &str = "http://127.0.0.1:8001";
/// Default test command run by `run_tests`
pub const DEFAULT_TEST_COMMAND: &str = "pytest -q";

/// Crew configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewConfig {
    /// Base URL of the Ollama-compatible backend
    pub ollama_base_url: String,
    /// Model name passed to the backend
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Per-request backend timeout
    pub backend_timeout: Duration,
    /// Base URL of the tool service
    pub tools_url: String,
    /// Command run by the `run_tests` tool
    pub test_command: String,
    /// Wall-clock limit for `run_tests`, in seconds; service default when unset
    pub test_timeout_secs: Option<u64>,
    /// Tool requests an agent may make per step
    pub max_iterations: usize,
    /// Extra attempts for a step failing with a retryable tool error
    pub step_retries: u32,
    /// Fixed pause between step attempts
    pub retry_backoff: Duration,
}

impl CrewConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With backend URL
    #[inline]
    #[must_use]
    pub fn with_ollama_base_url(mut self, url: impl Into<String>) -> Self {
        self.ollama_base_url = url.into();
        self
    }

    /// With model name
    #[inline]
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// With sampling temperature
    #[inline]
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// With backend request timeout
    #[inline]
    #[must_use]
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// With tool service URL
    #[inline]
    #[must_use]
    pub fn with_tools_url(mut self, url: impl Into<String>) -> Self {
        self.tools_url = url.into();
        self
    }

    /// With test command
    #[inline]
    #[must_use]
    pub fn with_test_command(mut self, command: impl Into<String>) -> Self {
        self.test_command = command.into();
        self
    }

    /// With test timeout
    #[inline]
    #[must_use]
    pub fn with_test_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.test_timeout_secs = secs;
        self
    }

    /// With tool-loop bound
    #[inline]
    #[must_use]
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// With step retries and backoff
    #[inline]
    #[must_use]
    pub fn with_step_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.step_retries = retries;
        self.retry_backoff = backoff;
        self
    }
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            backend_timeout: Duration::from_secs(300),
            tools_url: DEFAULT_TOOLS_URL.to_string(),
            test_command: DEFAULT_TEST_COMMAND.to_string(),
            test_timeout_secs: None,
            max_iterations: 8,
            step_retries: 0,
            retry_backoff: Duration::from_secs(2),
        }
    }
}
