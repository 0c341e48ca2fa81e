// crates/tabula-server/src/llm/factory.rs
// Provider factory: builds clients from credentials and resolves chain order

use crate::config::{ApiKeys, EnvConfig, TabulaConfig};
use crate::error::{Result, TabulaError};
use crate::http::create_shared_client;
use crate::llm::chain::{MAX_PROVIDERS, ProviderChain};
use crate::llm::deepseek::DeepSeekClient;
use crate::llm::gemini::GeminiClient;
use crate::llm::ollama::OllamaClient;
use crate::llm::provider::{LlmClient, Provider};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default order when no preference is configured
const DEFAULT_ORDER: [Provider; 3] = [Provider::DeepSeek, Provider::Gemini, Provider::Ollama];

/// Factory for creating and ordering LLM provider clients
pub struct ProviderFactory {
    clients: HashMap<Provider, Arc<dyn LlmClient>>,
    primary: Option<Provider>,
    secondary: Option<Provider>,
}

impl ProviderFactory {
    /// Build from environment plus config file. Environment preferences win.
    pub fn from_config(env: &EnvConfig, config: &TabulaConfig) -> Self {
        let primary = env
            .primary_provider
            .as_deref()
            .and_then(Provider::parse)
            .or_else(|| config.primary_provider());
        let secondary = env
            .secondary_provider
            .as_deref()
            .and_then(Provider::parse)
            .or_else(|| config.secondary_provider());

        let mut factory = Self::from_api_keys(&env.api_keys, config);
        factory.primary = primary;
        factory.secondary = secondary;
        factory
    }

    /// Create clients for every provider that has credentials
    pub fn from_api_keys(api_keys: &ApiKeys, config: &TabulaConfig) -> Self {
        let mut clients: HashMap<Provider, Arc<dyn LlmClient>> = HashMap::new();
        let shared = create_shared_client();

        if let Some(ref key) = api_keys.deepseek {
            let model = config
                .llm
                .deepseek_model
                .clone()
                .unwrap_or_else(|| Provider::DeepSeek.default_model().into());
            info!(model = %model, "DeepSeek client initialized");
            clients.insert(
                Provider::DeepSeek,
                Arc::new(DeepSeekClient::with_model(key.clone(), model)),
            );
        }

        if let Some(ref key) = api_keys.gemini {
            let model = config
                .llm
                .gemini_model
                .clone()
                .unwrap_or_else(|| Provider::Gemini.default_model().into());
            info!(model = %model, "Gemini client initialized");
            clients.insert(
                Provider::Gemini,
                Arc::new(GeminiClient::with_http_client(key.clone(), model, shared)),
            );
        }

        if let Some(ref host) = api_keys.ollama_host {
            let model = config
                .llm
                .ollama_model
                .clone()
                .unwrap_or_else(|| Provider::Ollama.default_model().into());
            info!(model = %model, host = %host, "Ollama client initialized");
            clients.insert(
                Provider::Ollama,
                Arc::new(OllamaClient::with_model(host.clone(), model)),
            );
        }

        Self {
            clients,
            primary: None,
            secondary: None,
        }
    }

    /// Build directly from prepared clients (tests, embedding)
    pub fn from_clients(clients: Vec<Arc<dyn LlmClient>>) -> Self {
        let mut primary = None;
        let mut secondary = None;
        let mut map = HashMap::new();
        for client in clients {
            let provider = client.provider_type();
            if primary.is_none() {
                primary = Some(provider);
            } else if secondary.is_none() && primary != Some(provider) {
                secondary = Some(provider);
            }
            map.insert(provider, client);
        }
        Self {
            clients: map,
            primary,
            secondary,
        }
    }

    pub fn has_providers(&self) -> bool {
        !self.clients.is_empty()
    }

    pub fn get_provider(&self, provider: Provider) -> Option<Arc<dyn LlmClient>> {
        self.clients.get(&provider).cloned()
    }

    /// Resolved call order: configured primary, configured secondary, then the
    /// default order fills remaining slots. Unavailable preferences are skipped.
    pub fn order(&self) -> Vec<Provider> {
        let mut order = Vec::with_capacity(MAX_PROVIDERS);
        let preferred = [self.primary, self.secondary];

        for provider in preferred.into_iter().flatten() {
            if !self.clients.contains_key(&provider) {
                warn!(provider = %provider, "Configured provider has no credentials, skipping");
                continue;
            }
            if !order.contains(&provider) {
                order.push(provider);
            }
        }

        for provider in DEFAULT_ORDER {
            if order.len() >= MAX_PROVIDERS {
                break;
            }
            if self.clients.contains_key(&provider) && !order.contains(&provider) {
                order.push(provider);
            }
        }

        order.truncate(MAX_PROVIDERS);
        order
    }

    /// Build the provider chain. Fails when nothing is configured.
    pub fn chain(&self, timeout: Duration) -> Result<ProviderChain> {
        let order = self.order();
        if order.is_empty() {
            return Err(TabulaError::NoProviders);
        }
        if order.len() == 1 {
            warn!(provider = %order[0], "Only one LLM provider configured, no stage fallback");
        }
        let names: Vec<String> = order.iter().map(|p| p.to_string()).collect();
        info!(providers = ?names, "LLM provider chain ready");

        let clients = order
            .iter()
            .filter_map(|p| self.clients.get(p).cloned())
            .collect();
        Ok(ProviderChain::new(clients, timeout))
    }
}
