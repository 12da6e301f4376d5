//! Model usage accounting.
//!
//! Every model call made by the invoker is recorded here, successful or
//! not, so a run can report how many calls and tokens verification cost.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::providers::TokenUsage;

/// Accumulated model usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    /// Total tokens used
    pub total_tokens: u64,

    /// Prompt/input tokens
    pub prompt_tokens: u64,

    /// Completion/output tokens
    pub completion_tokens: u64,

    /// Model calls that returned a response
    pub llm_calls: u32,

    /// Model calls that failed in transport
    pub failed_calls: u32,

    /// Responses that did not satisfy the output schema
    pub invalid_outputs: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    /// Add token usage from a provider response.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total());
        self.llm_calls += 1;
        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    fn merge(&mut self, other: &LlmUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.llm_calls += other.llm_calls;
        self.failed_calls += other.failed_calls;
        self.invalid_outputs += other.invalid_outputs;
        self.estimated_cost += other.estimated_cost;
    }

    /// Estimate cost for a usage entry.
    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        // USD per million tokens
        let (input_rate, output_rate) = match model {
            m if m.contains("gpt-4o-mini") => (0.15, 0.6),
            m if m.contains("gpt-4o") => (2.5, 10.0),
            m if m.contains("gpt-4.1-mini") => (0.4, 1.6),
            m if m.contains("gpt-4.1") => (2.0, 8.0),
            m if m.contains("haiku") => (1.0, 5.0),
            m if m.contains("opus") => (5.0, 25.0),
            m if m.contains("sonnet") => (3.0, 15.0),
            _ => (0.0, 0.0),
        };

        (f64::from(usage.prompt_tokens) / 1_000_000.0) * input_rate
            + (f64::from(usage.completion_tokens) / 1_000_000.0) * output_rate
    }
}

/// Thread-safe usage tracker shared by every call of a verifier.
#[derive(Debug, Default)]
pub struct UsageTracker {
    by_provider: RwLock<BTreeMap<String, LlmUsage>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed call.
    pub fn record(&self, provider: &str, usage: &TokenUsage, model: &str) {
        self.by_provider
            .write()
            .entry(provider.to_string())
            .or_default()
            .add(usage, model);
    }

    /// Record a transport failure.
    pub fn record_failure(&self, provider: &str) {
        self.by_provider
            .write()
            .entry(provider.to_string())
            .or_default()
            .failed_calls += 1;
    }

    /// Record a response that failed schema validation.
    pub fn record_invalid_output(&self, provider: &str) {
        self.by_provider
            .write()
            .entry(provider.to_string())
            .or_default()
            .invalid_outputs += 1;
    }

    /// Usage summed over all providers.
    pub fn total(&self) -> LlmUsage {
        let mut total = LlmUsage::default();
        for usage in self.by_provider.read().values() {
            total.merge(usage);
        }
        total
    }

    /// Usage per provider.
    pub fn by_provider(&self) -> BTreeMap<String, LlmUsage> {
        self.by_provider.read().clone()
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.by_provider.write().clear();
    }
}
