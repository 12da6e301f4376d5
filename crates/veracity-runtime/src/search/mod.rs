//! Evidence retrieval over interchangeable search providers.
//!
//! A [`SearchProvider`] turns a query into raw [`Evidence`]. The
//! [`EvidenceRetriever`] wraps one provider and owns every policy that must
//! not vary between providers: result caps, the empty-query short-circuit,
//! timeouts, the circuit breaker, caching and failure isolation.
//!
//! `retrieve` never fails. A provider outage is indistinguishable from
//! "no evidence found" to the workflow.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use veracity_core::Evidence;

use crate::cache::{CacheKey, EvidenceCache};
use crate::providers::CredentialError;
use crate::resilience::CircuitBreaker;

mod registry;

#[cfg(feature = "search")]
mod exa;
#[cfg(feature = "search")]
mod http;
#[cfg(feature = "search")]
mod serper;
#[cfg(feature = "search")]
mod tavily;

pub use registry::{SearchProviderFactory, SearchRegistry};

#[cfg(feature = "search")]
pub use exa::{ExaProvider, ExaProviderFactory};
#[cfg(feature = "search")]
pub use serper::{SerperProvider, SerperProviderFactory};
#[cfg(feature = "search")]
pub use tavily::{TavilyProvider, TavilyProviderFactory};

/// Errors from search providers. Never escape [`EvidenceRetriever::retrieve`].
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),

    #[error("Search provider not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Caps applied to every search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Maximum evidence items per query
    pub results_per_query: usize,

    /// Maximum characters per snippet
    pub max_characters: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            results_per_query: 5,
            max_characters: 2000,
        }
    }
}

/// A search backend reduced to a single capability.
///
/// Adapters may ignore the caps in `options` if their API cannot express
/// them; the retriever enforces them again.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search for `query`, most relevant results first.
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<Evidence>, SearchError>;

    /// Provider name for logs, circuit breaking and cache keys.
    fn name(&self) -> &str;
}

/// Apply count and length caps to raw provider results.
///
/// Items with blank text are dropped before counting; blank titles are
/// cleared.
pub fn normalize(items: Vec<Evidence>, options: &SearchOptions) -> Vec<Evidence> {
    items
        .into_iter()
        .filter(|e| !e.text.trim().is_empty())
        .take(options.results_per_query)
        .map(|mut e| {
            e.title = e.title.filter(|t| !t.trim().is_empty());
            e.capped(options.max_characters)
        })
        .collect()
}

/// Provider-agnostic evidence retrieval with failure isolation.
#[derive(Clone)]
pub struct EvidenceRetriever {
    provider: Arc<dyn SearchProvider>,
    options: SearchOptions,
    timeout: Duration,
    breaker: Option<Arc<CircuitBreaker>>,
    cache: Option<EvidenceCache>,
}

impl EvidenceRetriever {
    /// Create a retriever with default caps and a 15s timeout.
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            provider,
            options: SearchOptions::default(),
            timeout: Duration::from_secs(15),
            breaker: None,
            cache: None,
        }
    }

    /// Set the result caps.
    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the per-search timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Short-circuit searches while the provider's circuit is open.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Cache successful searches.
    pub fn with_cache(mut self, cache: EvidenceCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Name of the wrapped provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// The caps applied to every search.
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Retrieve evidence for `query`, most relevant first.
    ///
    /// Returns an empty list when the query is absent or blank (the
    /// provider is not called), when the circuit is open, and when the
    /// provider fails or times out.
    pub async fn retrieve(&self, query: Option<&str>) -> Vec<Evidence> {
        self.search(query, true).await
    }

    /// Like [`retrieve`](Self::retrieve), but never answered from the
    /// cache. A successful search still refreshes the cached entry.
    pub async fn retrieve_fresh(&self, query: Option<&str>) -> Vec<Evidence> {
        self.search(query, false).await
    }

    async fn search(&self, query: Option<&str>, use_cache: bool) -> Vec<Evidence> {
        let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) else {
            tracing::warn!("No search query to process");
            return Vec::new();
        };
        let provider = self.provider.name();

        let key = CacheKey::new(provider, query, &self.options);
        if let Some(cache) = self.cache.as_ref().filter(|_| use_cache) {
            if let Some(hit) = cache.get(&key).await {
                tracing::debug!(provider, query, items = hit.len(), "Search cache hit");
                return hit.as_ref().clone();
            }
        }

        if let Some(breaker) = &self.breaker {
            if !breaker.allow(provider) {
                tracing::warn!(provider, query, "Circuit open, skipping search");
                return Vec::new();
            }
        }

        tracing::info!(provider, query, "Searching for evidence");
        let call = self.provider.search(query, &self.options);
        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(items) => {
                if let Some(breaker) = &self.breaker {
                    breaker.record_success(provider);
                }
                let evidence = normalize(items, &self.options);
                tracing::info!(provider, query, items = evidence.len(), "Retrieved evidence");
                if let Some(cache) = &self.cache {
                    cache.insert(key, evidence.clone()).await;
                }
                evidence
            }
            Err(e) => {
                if let Some(breaker) = &self.breaker {
                    breaker.record_failure(provider);
                }
                tracing::warn!(
                    provider,
                    query,
                    error = %e,
                    "Search failed, continuing without evidence"
                );
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for EvidenceRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidenceRetriever")
            .field("provider", &self.provider.name())
            .field("options", &self.options)
            .field("timeout", &self.timeout)
            .field("circuit_breaker", &self.breaker.is_some())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}
