// crates/tabula-server/src/llm/chain.rs
// Ordered primary/secondary provider chain used by every orchestrator stage

use crate::error::{Result, TabulaError};
use crate::llm::circuit_breaker::CircuitBreaker;
use crate::llm::provider::{LlmClient, Provider};
use crate::llm::CompletionRequest;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// At most two providers take part in a stage: primary, then secondary.
pub const MAX_PROVIDERS: usize = 2;

/// A stage output together with the provider that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub provider: Provider,
}

/// Fixed-order provider handles with a uniform `attempt()`.
///
/// Each provider gets at most one call per `attempt()`. A call that errors,
/// times out, or yields output the stage's parser rejects moves on to the next
/// provider with the identical request.
#[derive(Clone)]
pub struct ProviderChain {
    clients: Vec<Arc<dyn LlmClient>>,
    timeout: Duration,
    breaker: CircuitBreaker,
}

impl ProviderChain {
    pub fn new(mut clients: Vec<Arc<dyn LlmClient>>, timeout: Duration) -> Self {
        clients.truncate(MAX_PROVIDERS);
        Self {
            clients,
            timeout,
            breaker: CircuitBreaker::new(),
        }
    }

    /// Chain with no providers; every stage uses its static fallback.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Duration::from_secs(30))
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Providers in call order
    pub fn providers(&self) -> Vec<Provider> {
        self.clients.iter().map(|c| c.provider_type()).collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `request` against the chain, returning the first output `parse` accepts.
    pub async fn attempt<T, F>(
        &self,
        stage: &str,
        request: &CompletionRequest,
        parse: F,
    ) -> Result<Attempted<T>>
    where
        F: Fn(&str) -> Result<T>,
    {
        if self.clients.is_empty() {
            return Err(TabulaError::NoProviders);
        }

        let mut last_error: Option<String> = None;

        for client in &self.clients {
            let provider = client.provider_type();
            if !self.breaker.is_available(provider) {
                debug!(stage, provider = %provider, "Skipping provider with open circuit");
                last_error = Some(format!("{} circuit open", provider));
                continue;
            }

            let outcome = tokio::time::timeout(self.timeout, client.complete(request.clone())).await;
            let completion = match outcome {
                Ok(Ok(completion)) => completion,
                Ok(Err(e)) => {
                    self.breaker.record_failure(provider);
                    warn!(stage, provider = %provider, error = %e, "Provider call failed");
                    last_error = Some(format!("{}: {}", provider, e));
                    continue;
                }
                Err(_) => {
                    self.breaker.record_failure(provider);
                    warn!(
                        stage,
                        provider = %provider,
                        timeout_secs = self.timeout.as_secs(),
                        "Provider call timed out"
                    );
                    last_error = Some(format!("{}: timed out", provider));
                    continue;
                }
            };
            self.breaker.record_success(provider);

            match parse(&completion.content) {
                Ok(value) => {
                    debug!(stage, provider = %provider, duration_ms = completion.duration_ms, "Stage output accepted");
                    return Ok(Attempted { value, provider });
                }
                Err(e) => {
                    warn!(stage, provider = %provider, error = %e, "Provider output rejected");
                    last_error = Some(format!("{}: {}", provider, e));
                }
            }
        }

        Err(TabulaError::Llm(format!(
            "{} stage exhausted providers ({})",
            stage,
            last_error.unwrap_or_else(|| "no attempt made".into())
        )))
    }
}
