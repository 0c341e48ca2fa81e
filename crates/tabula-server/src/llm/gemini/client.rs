// crates/tabula-server/src/llm/gemini/client.rs
// Google Gemini API client (non-streaming, JSON output mode)
// Translates provider-neutral messages into Gemini's contents/systemInstruction shape

use crate::http::create_shared_client;
use crate::llm::gemini::types::{
    GeminiContent, GeminiPart, GeminiRequest, GeminiResponse, GenerationConfig,
};
use crate::llm::http_client::LlmHttpClient;
use crate::llm::provider::{LlmClient, Provider};
use crate::llm::{Completion, CompletionRequest, Message, Usage};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{Span, debug, instrument};
use uuid::Uuid;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Google Gemini API client
pub struct GeminiClient {
    api_key: String,
    model: String,
    http: LlmHttpClient,
}

impl GeminiClient {
    /// Create a new Gemini client with default model
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, Provider::Gemini.default_model().to_string())
    }

    /// Create a new Gemini client with custom model
    pub fn with_model(api_key: String, model: String) -> Self {
        Self::with_http_client(api_key, model, create_shared_client())
    }

    /// Create a new Gemini client with a shared HTTP client
    pub fn with_http_client(api_key: String, model: String, client: reqwest::Client) -> Self {
        Self {
            api_key,
            model,
            http: LlmHttpClient::from_client(client),
        }
    }
}

/// Split system messages into `systemInstruction`; everything else becomes contents.
/// Gemini names the assistant role "model".
fn convert_messages(messages: &[Message]) -> (Option<GeminiContent>, Vec<GeminiContent>) {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for msg in messages {
        match msg.role.as_str() {
            "system" => system_parts.push(GeminiPart::text(msg.content.clone())),
            "assistant" => contents.push(GeminiContent {
                role: "model".into(),
                parts: vec![GeminiPart::text(msg.content.clone())],
            }),
            _ => contents.push(GeminiContent {
                role: "user".into(),
                parts: vec![GeminiPart::text(msg.content.clone())],
            }),
        }
    }

    let system = (!system_parts.is_empty()).then(|| GeminiContent {
        role: "user".into(),
        parts: system_parts,
    });
    (system, contents)
}

/// Join non-thought text parts of the first candidate
fn extract_content(response: &GeminiResponse) -> Option<String> {
    let candidate = response.candidates.as_ref()?.first()?;
    let text: String = candidate
        .content
        .parts
        .iter()
        .filter(|p| !p.thought)
        .map(|p| p.text.as_str())
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn provider_type(&self) -> Provider {
        Provider::Gemini
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }

    #[instrument(skip(self, request), fields(request_id, model = %self.model, message_count = request.messages.len()))]
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let request_id = Uuid::new_v4().to_string();
        let start_time = Instant::now();
        Span::current().record("request_id", &request_id);

        let (system_instruction, contents) = convert_messages(&request.messages);
        let body = GeminiRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
                response_mime_type: Some("application/json".into()),
            },
        };

        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_BASE, self.model, self.api_key
        );
        let body = serde_json::to_string(&body)?;
        debug!(request_id = %request_id, "Sending Gemini request");

        // Gemini authenticates via query-string key, not Bearer header
        let response_body = self
            .http
            .send(&request_id, |client| {
                client
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .body(body)
            })
            .await?;

        let duration_ms = start_time.elapsed().as_millis() as u64;

        let data: GeminiResponse = serde_json::from_str(&response_body)
            .map_err(|e| anyhow!("Failed to parse Gemini response: {}", e))?;

        let content =
            extract_content(&data).ok_or_else(|| anyhow!("Gemini response had no content"))?;

        let usage = data.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count.unwrap_or(0),
            total_tokens: u.total_token_count,
        });

        if let Some(ref u) = usage {
            crate::llm::logging::log_usage(&request_id, "Gemini", u);
        }
        crate::llm::logging::log_completion(&request_id, "Gemini", duration_ms, content.len());

        Ok(Completion {
            request_id,
            content,
            usage,
            duration_ms,
        })
    }
}
