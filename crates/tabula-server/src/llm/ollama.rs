// crates/tabula-server/src/llm/ollama.rs
// Ollama API client via OpenAI-compatible endpoint (local LLM)

use crate::llm::http_client::LlmHttpClient;
use crate::llm::openai_compat::{CompatChatConfig, execute_openai_compat_chat};
use crate::llm::provider::{LlmClient, Provider};
use crate::llm::{Completion, CompletionRequest};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::instrument;

/// Normalize Ollama base URL by stripping trailing slashes and /v1 suffix
fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim_end_matches('/').to_string();
    if url.ends_with("/v1") {
        url.truncate(url.len() - 3);
    }
    url
}

/// Check if a URL points to a local address (localhost, 127.0.0.1, [::1])
fn is_local_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.host() {
            Some(url::Host::Domain(d)) => d == "localhost",
            Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
            Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
            None => true,
        },
        Err(_) => true,
    }
}

/// Ollama API client (OpenAI-compatible endpoint, no auth required)
pub struct OllamaClient {
    base_url: String,
    model: String,
    http: LlmHttpClient,
}

impl OllamaClient {
    pub fn new(base_url: String) -> Self {
        Self::with_model(base_url, Provider::Ollama.default_model().into())
    }

    pub fn with_model(base_url: String, model: String) -> Self {
        // Local models are slower to first token than hosted ones
        let http = LlmHttpClient::new(Duration::from_secs(120), Duration::from_secs(10));
        let normalized = normalize_base_url(&base_url);

        if !is_local_url(&normalized) {
            tracing::warn!(
                "OLLAMA_HOST points to non-local address '{}'. Table samples are sent in prompts.",
                normalized
            );
        }

        Self {
            base_url: normalized,
            model,
            http,
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn provider_type(&self) -> Provider {
        Provider::Ollama
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }

    #[instrument(skip(self, request), fields(request_id, model = %self.model, message_count = request.messages.len()))]
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let config = CompatChatConfig {
            provider_name: "Ollama",
            model: self.model.clone(),
            json_output: true,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);

        execute_openai_compat_chat(config, request, |req_id, body| async move {
            self.http
                .send(&req_id, |client| {
                    client
                        .post(&url)
                        .header("Content-Type", "application/json")
                        .body(body)
                })
                .await
        })
        .await
    }
}
