// crates/tabula-server/src/llm/deepseek.rs
// DeepSeek API client (non-streaming, OpenAI-compatible endpoint)

use crate::llm::http_client::LlmHttpClient;
use crate::llm::openai_compat::{CompatChatConfig, execute_openai_compat_chat};
use crate::llm::provider::{LlmClient, Provider};
use crate::llm::{Completion, CompletionRequest};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::instrument;

const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/chat/completions";

/// deepseek-chat output cap
const MAX_OUTPUT_TOKENS: u32 = 8192;

/// DeepSeek API client
pub struct DeepSeekClient {
    api_key: String,
    model: String,
    http: LlmHttpClient,
}

impl DeepSeekClient {
    /// Create a new DeepSeek client with the default chat model
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, Provider::DeepSeek.default_model().into())
    }

    /// Create a new DeepSeek client with custom model
    pub fn with_model(api_key: String, model: String) -> Self {
        let http = LlmHttpClient::new(Duration::from_secs(60), Duration::from_secs(10));
        Self {
            api_key,
            model,
            http,
        }
    }

    /// The reasoner model rejects `response_format`
    fn supports_json_output(model: &str) -> bool {
        !model.contains("reasoner")
    }
}

#[async_trait]
impl LlmClient for DeepSeekClient {
    fn provider_type(&self) -> Provider {
        Provider::DeepSeek
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }

    #[instrument(skip(self, request), fields(request_id, model = %self.model, message_count = request.messages.len()))]
    async fn complete(&self, mut request: CompletionRequest) -> Result<Completion> {
        request.max_tokens = request.max_tokens.min(MAX_OUTPUT_TOKENS);
        let config = CompatChatConfig {
            provider_name: "DeepSeek",
            model: self.model.clone(),
            json_output: Self::supports_json_output(&self.model),
        };

        execute_openai_compat_chat(config, request, |req_id, body| async move {
            self.http
                .post_bearer(&req_id, DEEPSEEK_API_URL, &self.api_key, body)
                .await
        })
        .await
    }
}
