// crates/tabula-server/src/llm/http_client.rs
// Shared HTTP client configuration for all LLM providers

use anyhow::{Result, anyhow};
use reqwest::Client;
use std::time::Duration;
use tracing::warn;

/// Default request timeout when creating from an existing client
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
/// Default connect timeout when creating from an existing client
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Shared HTTP client for all LLM providers.
///
/// Makes exactly one attempt per call. Stage-level fallback to the secondary
/// provider is the only retry in the pipeline.
pub struct LlmHttpClient {
    client: Client,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl LlmHttpClient {
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            request_timeout,
            connect_timeout,
        }
    }

    /// Create from an existing reqwest::Client
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// POST a JSON body with Bearer auth and return the response text
    pub async fn post_bearer(
        &self,
        request_id: &str,
        url: &str,
        api_key: &str,
        body: String,
    ) -> Result<String> {
        self.send(request_id, |client| {
            client
                .post(url)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .body(body)
        })
        .await
    }

    /// Send a request built by the caller and return the response body.
    ///
    /// The `build_request` closure lets callers customize URL, headers, and
    /// auth (Gemini uses a query-string key, Ollama none at all).
    pub async fn send<F>(&self, request_id: &str, build_request: F) -> Result<String>
    where
        F: FnOnce(&Client) -> reqwest::RequestBuilder,
    {
        let response = build_request(&self.client).send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connect"
            } else {
                "request"
            };
            warn!(request_id = %request_id, kind, error = %e, "LLM HTTP request failed");
            anyhow!("{} error: {}", kind, e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(
                request_id = %request_id,
                status = %status,
                transient = status.as_u16() == 429 || status.is_server_error(),
                "LLM API returned error status"
            );
            return Err(anyhow!("API error {}: {}", status, truncate(&error_body, 300)));
        }

        Ok(response.text().await?)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
