// crates/tabula-server/src/llm/testing.rs
// Scripted LLM client for stage tests

use crate::llm::provider::{LlmClient, Provider};
use crate::llm::{Completion, CompletionRequest};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Answers by stage. The stage is read from the `Stage: <name>.` line of the
/// system prompt; unscripted stages fail.
pub struct ScriptedClient {
    provider: Provider,
    replies: HashMap<&'static str, String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            replies: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, stage: &'static str, content: impl Into<String>) -> Self {
        self.replies.insert(stage, content.into());
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Calls made for one stage
    pub fn calls(&self, stage: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.as_str() == stage)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn stage_of(request: &CompletionRequest) -> String {
    request
        .messages
        .first()
        .and_then(|m| m.content.split("Stage: ").nth(1))
        .and_then(|rest| rest.split('.').next())
        .unwrap_or("")
        .to_string()
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<Completion> {
        let stage = stage_of(&request);
        self.calls.lock().unwrap().push(stage.clone());
        match self.replies.get(stage.as_str()) {
            Some(content) => Ok(Completion {
                request_id: format!("scripted-{stage}"),
                content: content.clone(),
                usage: None,
                duration_ms: 1,
            }),
            None => Err(anyhow::anyhow!("no scripted reply for stage '{stage}'")),
        }
    }

    fn provider_type(&self) -> Provider {
        self.provider
    }

    fn model_name(&self) -> String {
        "scripted".into()
    }
}
