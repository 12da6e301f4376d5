//! Model provider factories.
//!
//! The `llm_provider` config key names a registered factory, which builds
//! the provider from the `model.options` JSON.
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let provider = registry.create("openai", &serde_json::json!({"api_key": "..."}))?;
//! ```

use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LlmProvider, ProviderError};
use crate::registry::{Registered, Registry};

/// Builds a model provider from JSON options.
pub trait ProviderFactory: Send + Sync {
    /// Registered name, e.g. "openai".
    fn provider_type(&self) -> &'static str;

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Check options (credentials, URLs) without building a provider.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;

    /// Options a config file would start from.
    fn default_config(&self) -> JsonValue {
        serde_json::json!({})
    }

    fn description(&self) -> &'static str {
        "Model provider"
    }
}

impl Registered for dyn ProviderFactory {
    const KIND: &'static str = "model provider";

    fn registered_name(&self) -> &'static str {
        self.provider_type()
    }

    fn registered_description(&self) -> &'static str {
        self.description()
    }
}

/// Model provider factories keyed by `llm_provider` name.
pub type ProviderRegistry = Registry<dyn ProviderFactory>;

impl Registry<dyn ProviderFactory> {
    fn factory(&self, name: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.get(name)
            .map_err(|e| ProviderError::NotConfigured(e.to_string()))
    }

    /// Build the provider registered under `name`.
    pub fn create(
        &self,
        name: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.factory(name)?.create(config)
    }

    pub fn validate(&self, name: &str, config: &JsonValue) -> Result<(), ProviderError> {
        self.factory(name)?.validate_config(config)
    }

    pub fn default_config(&self, name: &str) -> Option<JsonValue> {
        self.get(name).ok().map(|f| f.default_config())
    }

    /// Every model provider compiled in (features `openai`, `anthropic`).
    #[allow(unused_mut)]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::OpenAiProviderFactory));
        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(super::AnthropicProviderFactory));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatMessage, CompletionConfig, CompletionResponse, TokenUsage};
    use async_trait::async_trait;

    struct EchoModel {
        label: String,
    }

    #[async_trait]
    impl LlmProvider for EchoModel {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                content: messages.last().map(|m| m.content.clone()).unwrap_or_default(),
                usage: TokenUsage::default(),
                model: self.label.clone(),
                stop_reason: None,
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            &self.label
        }
    }

    struct EchoFactory;

    impl ProviderFactory for EchoFactory {
        fn provider_type(&self) -> &'static str {
            "echo"
        }

        fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
            self.validate_config(config)?;
            let label = config["label"].as_str().unwrap_or("echo").to_string();
            Ok(Arc::new(EchoModel { label }))
        }

        fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
            match config.get("label") {
                Some(v) if !v.is_string() => Err(ProviderError::NotConfigured(
                    "label must be a string".to_string(),
                )),
                _ => Ok(()),
            }
        }

        fn default_config(&self) -> JsonValue {
            serde_json::json!({"label": "echo"})
        }
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoFactory));
        registry
    }

    #[tokio::test]
    async fn test_create_from_options() {
        let provider = registry().create("echo", &serde_json::json!({"label": "e1"})).unwrap();
        assert_eq!(provider.name(), "e1");

        let response = provider
            .complete(vec![ChatMessage::user("ping")], &CompletionConfig::default())
            .await
            .unwrap();
        assert_eq!(response.content, "ping");
    }

    #[test]
    fn test_unknown_provider_is_not_configured() {
        match registry().create("mistral", &serde_json::json!({})) {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("Unknown model provider: 'mistral'"));
                assert!(msg.contains("echo"));
            }
            _ => panic!("Expected NotConfigured error"),
        }
    }

    #[test]
    fn test_validate_and_defaults() {
        let registry = registry();
        assert!(registry.validate("echo", &serde_json::json!({})).is_ok());
        assert!(registry.validate("echo", &serde_json::json!({"label": 3})).is_err());
        assert_eq!(registry.default_config("echo"), Some(serde_json::json!({"label": "echo"})));
        assert!(registry.default_config("mistral").is_none());
        assert_eq!(registry.describe(), vec![("echo", "Model provider")]);
    }

    #[cfg(all(feature = "openai", feature = "anthropic"))]
    #[test]
    fn test_defaults_include_builtin_providers() {
        let registry = ProviderRegistry::with_defaults();
        assert!(registry.has_provider("openai"));
        assert!(registry.has_provider("anthropic"));
    }
}
