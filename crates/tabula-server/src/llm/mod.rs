// crates/tabula-server/src/llm/mod.rs
// LLM provider clients and the stage-level provider chain

pub mod chain;
pub mod circuit_breaker;
pub mod deepseek;
pub mod extract;
pub mod factory;
pub mod gemini;
mod http_client;
pub mod logging;
pub mod ollama;
pub mod openai_compat;
pub mod prompt;
pub mod provider;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use chain::{Attempted, ProviderChain};
pub use circuit_breaker::CircuitBreaker;
pub use deepseek::DeepSeekClient;
pub use extract::extract_json;
pub use factory::ProviderFactory;
pub use gemini::GeminiClient;
pub use http_client::LlmHttpClient;
pub use ollama::OllamaClient;
pub use prompt::PromptBuilder;
pub use provider::{LlmClient, Provider};
pub use types::{Completion, CompletionRequest, Message, Usage};
