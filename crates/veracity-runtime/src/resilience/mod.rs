//! Resilience patterns for veracity-runtime.
//!
//! This module provides:
//! - Circuit breaker keyed by search provider
//! - Model usage accounting

mod circuit_breaker;
mod usage;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use usage::{LlmUsage, UsageTracker};
