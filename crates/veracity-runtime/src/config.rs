//! Runtime configuration.
//!
//! Loaded from YAML or JSON. Every field has a default, so an empty file is
//! a valid configuration. Durations are written as human-readable strings
//! such as `"15s"` or `"500ms"`.
//!
//! ```yaml
//! search:
//!   search_provider: exa
//!   results_per_query: 5
//!   max_characters: 2000
//!   timeout: 15s
//! model:
//!   llm_provider: openai
//!   model: gpt-4o-mini
//! invoker:
//!   max_attempts: 3
//!   consensus_samples: 5
//!   sample_timeout: 30s
//! workflow:
//!   max_retries: 3
//!   token_budget: 8000
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use veracity_core::WorkflowPolicy;

use crate::cache::CacheConfig;
use crate::providers::CompletionConfig;
use crate::resilience::CircuitBreakerConfig;
use crate::search::SearchOptions;

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// (De)serialize a `Duration` as a humantime string ("30s", "1m 30s").
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom)
    }
}

/// Evidence retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Registered search provider name (`exa`, `tavily`, `serper`, `default`)
    pub search_provider: String,

    /// Maximum evidence items per query
    pub results_per_query: usize,

    /// Maximum characters per snippet
    pub max_characters: usize,

    /// Per-search timeout
    #[serde(with = "duration_str")]
    pub timeout: Duration,

    /// Provider-specific options (`api_key`, `base_url`, ...)
    pub options: JsonValue,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            search_provider: "default".to_string(),
            results_per_query: 5,
            max_characters: 2000,
            timeout: Duration::from_secs(15),
            options: serde_json::json!({}),
        }
    }
}

impl SearchConfig {
    /// The caps handed to the retriever.
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            results_per_query: self.results_per_query,
            max_characters: self.max_characters,
        }
    }
}

/// Generative model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Registered LLM provider name (`openai`, `anthropic`)
    pub llm_provider: String,

    /// Model identifier
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Per-request timeout
    #[serde(with = "duration_str")]
    pub timeout: Duration,

    /// Provider-specific options (`api_key`, `base_url`, ...)
    pub options: JsonValue,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            llm_provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            timeout: Duration::from_secs(30),
            options: serde_json::json!({}),
        }
    }
}

impl ModelConfig {
    /// Completion settings for each model call.
    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
            response_schema: None,
        }
    }
}

/// Structured invoker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokerConfig {
    /// Attempts per call before giving up (at least 1)
    pub max_attempts: u32,

    /// First backoff delay between attempts
    #[serde(with = "duration_str")]
    pub retry_min_delay: Duration,

    /// Upper bound on the backoff delay
    #[serde(with = "duration_str")]
    pub retry_max_delay: Duration,

    /// Independent samples per evaluation; 1 disables voting
    pub consensus_samples: usize,

    /// Deadline for each consensus sample
    #[serde(with = "duration_str")]
    pub sample_timeout: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_min_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(10),
            consensus_samples: 1,
            sample_timeout: Duration::from_secs(30),
        }
    }
}

/// Workflow loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Retries after an insufficient verdict; 0 disables retry
    pub max_retries: u32,

    /// Token budget for the evaluation prompt
    pub token_budget: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            token_budget: 8000,
        }
    }
}

impl WorkflowConfig {
    pub fn policy(&self) -> WorkflowPolicy {
        WorkflowPolicy {
            max_retries: self.max_retries,
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub search: SearchConfig,
    pub model: ModelConfig,
    pub invoker: InvokerConfig,
    pub workflow: WorkflowConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
}

impl RuntimeConfig {
    /// Parse and validate a YAML configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = if yaml.trim().is_empty() {
            RuntimeConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file. `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.search_provider.trim().is_empty() {
            return Err(ConfigError::invalid("search.search_provider", "must not be empty"));
        }
        if self.search.results_per_query == 0 {
            return Err(ConfigError::invalid("search.results_per_query", "must be at least 1"));
        }
        if self.search.max_characters == 0 {
            return Err(ConfigError::invalid("search.max_characters", "must be at least 1"));
        }
        if self.search.timeout.is_zero() {
            return Err(ConfigError::invalid("search.timeout", "must be greater than zero"));
        }

        if self.model.llm_provider.trim().is_empty() {
            return Err(ConfigError::invalid("model.llm_provider", "must not be empty"));
        }
        if self.model.model.trim().is_empty() {
            return Err(ConfigError::invalid("model.model", "must not be empty"));
        }
        if self.model.max_tokens == 0 {
            return Err(ConfigError::invalid("model.max_tokens", "must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::invalid("model.temperature", "must be between 0.0 and 2.0"));
        }
        if self.model.timeout.is_zero() {
            return Err(ConfigError::invalid("model.timeout", "must be greater than zero"));
        }

        if self.invoker.max_attempts == 0 {
            return Err(ConfigError::invalid("invoker.max_attempts", "must be at least 1"));
        }
        if self.invoker.consensus_samples == 0 {
            return Err(ConfigError::invalid("invoker.consensus_samples", "must be at least 1"));
        }
        if self.invoker.sample_timeout.is_zero() {
            return Err(ConfigError::invalid("invoker.sample_timeout", "must be greater than zero"));
        }
        if self.invoker.retry_max_delay < self.invoker.retry_min_delay {
            return Err(ConfigError::invalid(
                "invoker.retry_max_delay",
                "must not be shorter than retry_min_delay",
            ));
        }

        if self.workflow.token_budget == 0 {
            return Err(ConfigError::invalid("workflow.token_budget", "must be at least 1"));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if self.circuit_breaker.success_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.success_threshold",
                "must be at least 1",
            ));
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::invalid(
                "cache.max_entries",
                "must be at least 1 when caching is enabled",
            ));
        }

        for warning in self.warnings() {
            tracing::warn!("{}", warning);
        }
        Ok(())
    }

    /// Settings that are valid but probably not what was meant.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.invoker.consensus_samples > 1 && self.model.temperature == 0.0 {
            warnings.push(format!(
                "invoker.consensus_samples is {} but model.temperature is 0.0; \
                 samples will mostly agree and the vote adds cost without signal",
                self.invoker.consensus_samples
            ));
        }
        warnings
    }
}
