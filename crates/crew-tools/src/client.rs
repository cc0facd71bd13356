//! Typed client for the tool service endpoints

use crate::error::{ToolErrorCause, ToolInvocationError};
use crew_protocol::{
    ErrorBody, ExecRequest, ExecResponse, HealthResponse, ListRequest, ListResponse, ReadRequest,
    ReadResponse, ScanReport, ScanRequest, WriteRequest, WriteResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Per-request limit for calls that do not run a command
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Slack added on top of a command's own timeout before the request gives up
const EXEC_GRACE: Duration = Duration::from_secs(10);

/// HTTP client bound to one tool service
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ToolClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl ToolClient {
    /// Client for the service at `base_url` (e.g. `http://127.0.0.1:8001`)
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url)
    }

    /// Client reusing an existing `reqwest` client
    #[must_use]
    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the per-request timeout
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Base URL without a trailing slash
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Read a file
    ///
    /// # Errors
    /// Any [`ToolInvocationError`]
    pub async fn read(&self, path: &str) -> Result<String, ToolInvocationError> {
        let body = ReadRequest {
            path: path.to_string(),
        };
        let resp: ReadResponse = self.post("read", &body, self.request_timeout).await?;
        Ok(resp.content)
    }

    /// Replace a file's content
    ///
    /// # Errors
    /// Any [`ToolInvocationError`]
    pub async fn write(&self, path: &str, content: &str) -> Result<(), ToolInvocationError> {
        let body = WriteRequest {
            path: path.to_string(),
            content: content.to_string(),
        };
        let resp: WriteResponse = self.post("write", &body, self.request_timeout).await?;
        if resp.ok {
            Ok(())
        } else {
            Err(ToolInvocationError::new(
                "write",
                ToolErrorCause::Decode("write was not acknowledged".to_string()),
            ))
        }
    }

    /// List a directory
    ///
    /// # Errors
    /// Any [`ToolInvocationError`]
    pub async fn list(&self, path: &str) -> Result<Vec<String>, ToolInvocationError> {
        let body = ListRequest {
            path: path.to_string(),
        };
        let resp: ListResponse = self.post("list", &body, self.request_timeout).await?;
        Ok(resp.entries)
    }

    /// Run a command; non-zero exits are results, not errors
    ///
    /// The request is allowed to outlive the command's own timeout so the
    /// service can report `TimedOut` itself.
    ///
    /// # Errors
    /// Any [`ToolInvocationError`]
    pub async fn execute(&self, request: &ExecRequest) -> Result<ExecResponse, ToolInvocationError> {
        let timeout = request
            .timeout
            .map_or(self.request_timeout, |secs| {
                self.request_timeout.max(Duration::from_secs(secs) + EXEC_GRACE)
            });
        self.post("exec", request, timeout).await
    }

    /// Scan a path with the static-analysis tool
    ///
    /// # Errors
    /// Any [`ToolInvocationError`]
    pub async fn scan(&self, path: &str) -> Result<ScanReport, ToolInvocationError> {
        let body = ScanRequest {
            path: path.to_string(),
        };
        self.post("scan", &body, self.request_timeout).await
    }

    /// Check `GET /healthz`
    ///
    /// # Errors
    /// Any [`ToolInvocationError`]
    pub async fn health(&self) -> Result<HealthResponse, ToolInvocationError> {
        let url = format!("{}/healthz", self.base_url);
        let resp = self
            .http
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| ToolInvocationError::from_transport("healthz", &e))?;
        decode("healthz", resp).await
    }

    async fn post<Req, Resp>(
        &self,
        endpoint: &str,
        body: &Req,
        timeout: Duration,
    ) -> Result<Resp, ToolInvocationError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{endpoint}", self.base_url);
        tracing::debug!(%url, "calling tool service");
        let resp = self
            .http
            .post(&url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(endpoint, error = %e, "tool service unreachable");
                ToolInvocationError::from_transport(endpoint, &e)
            })?;
        decode(endpoint, resp).await
    }
}

async fn decode<T: DeserializeOwned>(
    endpoint: &str,
    resp: reqwest::Response,
) -> Result<T, ToolInvocationError> {
    let status = resp.status();
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| ToolInvocationError::from_transport(endpoint, &e))?;

    if !status.is_success() {
        let detail = serde_json::from_slice::<ErrorBody>(&bytes).map_or_else(
            |_| String::from_utf8_lossy(&bytes).into_owned(),
            |body| body.detail,
        );
        return Err(ToolInvocationError::from_status(endpoint, status, detail));
    }

    serde_json::from_slice(&bytes).map_err(|e| {
        ToolInvocationError::new(endpoint, ToolErrorCause::Decode(e.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = ToolClient::new("http://localhost:8001/");
        assert_eq!(client.base_url(), "http://localhost:8001");
    }
}
