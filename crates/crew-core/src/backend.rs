//! Text-completion backend seam
//!
//! Agents talk to the language model only through [`CompletionBackend`].
//! [`OllamaBackend`] implements it over the Ollama chat API; tests script
//! it instead.

use crate::config::CrewConfig;
use crate::error::BackendError;
use async_trait::async_trait;
use crew_protocol::ToolName;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the agent
    System,
    /// Task input
    User,
    /// Model output
    Assistant,
    /// Result of a tool call
    Tool,
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedCall {
    /// Tool name as the model spelled it
    pub name: String,
    /// Arguments, normally a JSON object
    pub arguments: Value,
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Speaker
    pub role: Role,
    /// Text content
    pub content: String,
    /// Tool call carried by an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<RequestedCall>,
}

impl Message {
    /// System message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    /// User message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    /// Tool result message
    #[must_use]
    pub fn tool(content: impl Into<String>) -> Self {
        Self::text(Role::Tool, content)
    }

    /// Assistant message requesting a tool call
    #[must_use]
    pub fn tool_request(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_call: Some(RequestedCall {
                name: name.into(),
                arguments,
            }),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call: None,
        }
    }
}

/// Input of one completion
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Conversation so far
    pub messages: Vec<Message>,
    /// Tools the model may call
    pub tools: Vec<ToolName>,
}

/// What the model decided
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The step's answer
    FinalAnswer(String),
    /// A tool call to perform before asking again
    ToolRequest {
        /// Tool name as the model spelled it
        name: String,
        /// Arguments, normally a JSON object
        arguments: Value,
    },
}

/// Opaque text-completion capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Produce the next completion for a conversation
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, BackendError>;
}

/// Backend speaking the Ollama `/api/chat` protocol
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaBackend {
    /// Backend for `base_url` using `model`
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let config = CrewConfig::default();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: config.temperature,
            timeout: config.backend_timeout,
        }
    }

    /// Backend configured from a [`CrewConfig`]
    #[must_use]
    pub fn from_config(config: &CrewConfig) -> Self {
        Self::new(&config.ollama_base_url, &config.model)
            .with_temperature(config.temperature)
            .with_timeout(config.backend_timeout)
    }

    /// With sampling temperature
    #[inline]
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Model name
    #[inline]
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(wire_message).collect();
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.as_str(),
                            "description": tool.description(),
                            "parameters": tool.parameters(),
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

fn wire_message(message: &Message) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let mut value = json!({ "role": role, "content": message.content });
    if let Some(call) = &message.tool_call {
        value["tool_calls"] = json!([{
            "function": { "name": call.name, "arguments": call.arguments }
        }]);
    }
    value
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Interpret a chat response: the first tool call wins over any content
fn interpret(response: ChatResponse) -> Completion {
    match response.message.tool_calls.into_iter().next() {
        Some(call) => {
            // Some models send the arguments as a JSON-encoded string.
            let arguments = match call.function.arguments {
                Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
                other => other,
            };
            Completion::ToolRequest {
                name: call.function.name,
                arguments,
            }
        }
        None => Completion::FinalAnswer(response.message.content),
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, BackendError> {
        let url = format!("{}/api/chat", self.base_url);
        tracing::debug!(%url, model = %self.model, messages = request.messages.len(), "requesting completion");

        let resp = self
            .http
            .post(&url)
            .json(&self.body(&request))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).chars().take(400).collect();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(interpret(parsed))
    }
}
