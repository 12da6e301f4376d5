//! Search provider factories.
//!
//! The `search_provider` config key is resolved here once, when the
//! verifier is built. An unknown name is a configuration error, never a
//! per-call one.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{SearchError, SearchProvider};
use crate::registry::{Registered, Registry};

/// Builds a search provider from JSON options.
pub trait SearchProviderFactory: Send + Sync {
    /// Registered name, e.g. "exa".
    fn provider_type(&self) -> &'static str;

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn SearchProvider>, SearchError>;

    /// Check options without building a provider.
    fn validate_config(&self, config: &JsonValue) -> Result<(), SearchError>;

    fn description(&self) -> &'static str {
        "Search provider"
    }
}

impl Registered for dyn SearchProviderFactory {
    const KIND: &'static str = "search provider";

    fn registered_name(&self) -> &'static str {
        self.provider_type()
    }

    fn registered_description(&self) -> &'static str {
        self.description()
    }
}

/// Search provider factories keyed by `search_provider` name.
pub type SearchRegistry = Registry<dyn SearchProviderFactory>;

impl Registry<dyn SearchProviderFactory> {
    fn factory(&self, name: &str) -> Result<&Arc<dyn SearchProviderFactory>, SearchError> {
        self.get(name)
            .map_err(|e| SearchError::NotConfigured(e.to_string()))
    }

    /// Build the provider registered under `name` or its alias.
    pub fn create(
        &self,
        name: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn SearchProvider>, SearchError> {
        let provider = self.factory(name)?.create(config)?;
        tracing::debug!(requested = name, provider = provider.name(), "Search provider resolved");
        Ok(provider)
    }

    pub fn validate(&self, name: &str, config: &JsonValue) -> Result<(), SearchError> {
        self.factory(name)?.validate_config(config)
    }

    /// The HTTP providers (feature `search`). `default` is an alias of `exa`.
    #[allow(unused_mut)]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "search")]
        {
            registry.register(Arc::new(super::ExaProviderFactory));
            registry.register(Arc::new(super::TavilyProviderFactory));
            registry.register(Arc::new(super::SerperProviderFactory));
        }
        registry.alias("default", "exa");
        registry
    }
}
