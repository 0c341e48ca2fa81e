// crates/tabula-server/src/llm/gemini/mod.rs
// Google Gemini API client

mod client;
pub mod types;

pub use client::GeminiClient;
