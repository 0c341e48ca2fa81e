// crates/tabula-server/src/llm/openai_compat/mod.rs
// Shared OpenAI-compatible request/response handling for DeepSeek and Ollama

mod request;
mod response;

pub use request::ChatRequest;
pub use response::{ChatResponse, ResponseChoice, parse_chat_response};

use crate::llm::{Completion, CompletionRequest};
use anyhow::Result;
use std::future::Future;
use std::time::Instant;
use tracing::{Span, debug};
use uuid::Uuid;

/// Per-provider knobs for an OpenAI-compatible call
pub struct CompatChatConfig {
    pub provider_name: &'static str,
    pub model: String,
    /// Whether the endpoint accepts `response_format: json_object`
    pub json_output: bool,
}

/// Build the request body, send it through `send`, and parse the response.
///
/// `send` receives the request id and serialized body and returns the raw
/// response text; providers differ only in URL and auth.
pub async fn execute_openai_compat_chat<F, Fut>(
    config: CompatChatConfig,
    request: CompletionRequest,
    send: F,
) -> Result<Completion>
where
    F: FnOnce(String, String) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let request_id = Uuid::new_v4().to_string();
    let start = Instant::now();
    Span::current().record("request_id", &request_id);

    let body = ChatRequest::new(config.model.clone(), request.messages)
        .with_max_tokens(request.max_tokens)
        .with_temperature(request.temperature)
        .with_json_output(config.json_output);
    let body = serde_json::to_string(&body)?;
    debug!(request_id = %request_id, provider = config.provider_name, "Sending chat request");

    let response_body = send(request_id.clone(), body).await?;
    let duration_ms = start.elapsed().as_millis() as u64;

    let completion = parse_chat_response(&response_body, &request_id, duration_ms)?;
    if let Some(ref usage) = completion.usage {
        crate::llm::logging::log_usage(&request_id, config.provider_name, usage);
    }
    crate::llm::logging::log_completion(
        &request_id,
        config.provider_name,
        duration_ms,
        completion.content.len(),
    );
    Ok(completion)
}
