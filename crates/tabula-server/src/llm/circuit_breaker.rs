// crates/tabula-server/src/llm/circuit_breaker.rs
// Per-provider circuit breaker: a provider that keeps failing is skipped for a
// while instead of burning its full timeout on every stage.

use crate::llm::provider::Provider;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Failures within the window that trip the circuit.
const FAILURE_THRESHOLD: u32 = 3;

/// Window in which failures are counted.
const FAILURE_WINDOW: Duration = Duration::from_secs(5 * 60);

/// How long a tripped circuit stays open before a single probe is allowed.
const COOLDOWN: Duration = Duration::from_secs(2 * 60);

#[derive(Debug, Clone)]
enum State {
    Closed { failures: Vec<Instant> },
    Open { tripped_at: Instant },
    /// Cooldown elapsed; one probe request is in flight.
    HalfOpen,
}

impl Default for State {
    fn default() -> Self {
        Self::Closed {
            failures: Vec::new(),
        }
    }
}

/// Thread-safe circuit breaker keyed by provider.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    states: Arc<Mutex<HashMap<Provider, State>>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a request may be sent to `provider` right now.
    ///
    /// An open circuit whose cooldown has elapsed moves to half-open and lets
    /// exactly one caller through.
    pub fn is_available(&self, provider: Provider) -> bool {
        let Ok(mut states) = self.states.lock() else {
            return true;
        };
        let state = states.entry(provider).or_default();

        match state {
            State::Closed { .. } => true,
            State::Open { tripped_at } => {
                if tripped_at.elapsed() >= COOLDOWN {
                    info!(provider = %provider, "Circuit half-open, allowing probe request");
                    *state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
            State::HalfOpen => false,
        }
    }

    /// Record a successful call; closes the circuit.
    pub fn record_success(&self, provider: Provider) {
        let Ok(mut states) = self.states.lock() else {
            return;
        };
        let state = states.entry(provider).or_default();

        let was_half_open = matches!(state, State::HalfOpen);
        *state = State::default();

        if was_half_open {
            info!(provider = %provider, "Circuit recovered (half-open probe succeeded)");
        }
    }

    /// Record a failed call (timeout or transport/API error).
    pub fn record_failure(&self, provider: Provider) {
        let Ok(mut states) = self.states.lock() else {
            return;
        };
        let state = states.entry(provider).or_default();
        let now = Instant::now();

        match state {
            State::Closed { failures } => {
                failures.push(now);
                failures.retain(|t| now.duration_since(*t) < FAILURE_WINDOW);

                if failures.len() as u32 >= FAILURE_THRESHOLD {
                    warn!(
                        provider = %provider,
                        failures = failures.len(),
                        "Circuit tripped, provider skipped for {}s",
                        COOLDOWN.as_secs()
                    );
                    *state = State::Open { tripped_at: now };
                }
            }
            State::HalfOpen => {
                warn!(provider = %provider, "Half-open probe failed, circuit re-tripped");
                *state = State::Open { tripped_at: now };
            }
            State::Open { .. } => {}
        }
    }
}
