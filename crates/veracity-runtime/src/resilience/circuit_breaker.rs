//! Circuit breaker for search providers.
//!
//! When a provider fails repeatedly, its circuit opens and the retriever
//! answers "no evidence" without calling it until the recovery timeout
//! has passed.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::duration_str;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Time before a half-open probe is allowed (e.g. "30s")
    #[serde(with = "duration_str")]
    pub recovery_timeout: Duration,

    /// Successes in half-open state needed to close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Calls are short-circuited
    Open { opened_at: Instant },

    /// Probing whether the provider recovered
    HalfOpen { successes: u32 },
}

/// Per-provider circuit breaker. Circuits recover independently.
#[derive(Debug)]
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether a call to `provider` may go ahead.
    ///
    /// An open circuit whose recovery timeout has elapsed moves to
    /// half-open and lets the call through.
    pub fn allow(&self, provider: &str) -> bool {
        let mut states = self.states.write();
        match states.get(provider).copied() {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    states.insert(provider.to_string(), CircuitState::HalfOpen { successes: 0 });
                    tracing::info!(provider, "Circuit half-open, probing provider");
                    true
                } else {
                    false
                }
            }
            _ => true,
        }
    }

    /// Record a successful call.
    pub fn record_success(&self, provider: &str) {
        let mut states = self.states.write();
        match states.get(provider).copied() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(provider.to_string(), CircuitState::Closed { failures: 0 });
                    tracing::info!(provider, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        provider.to_string(),
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(provider.to_string(), CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self, provider: &str) {
        let mut states = self.states.write();
        let failures = match states.get(provider).copied() {
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    provider.to_string(),
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(provider, "Circuit reopened after failed recovery probe");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
            Some(CircuitState::Closed { failures }) => failures + 1,
            None => 1,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                provider.to_string(),
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(provider, failures, "Circuit opened after repeated failures");
        } else {
            states.insert(provider.to_string(), CircuitState::Closed { failures });
        }
    }

    /// Current state of a provider's circuit.
    pub fn state(&self, provider: &str) -> CircuitState {
        self.states
            .read()
            .get(provider)
            .copied()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
