//! Caching layer for search results.
//!
//! Retries and repeated claims often issue the same query; caching the
//! normalized evidence avoids paying the search provider twice.

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use veracity_core::Evidence;

use crate::config::duration_str;
use crate::search::SearchOptions;

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether search results are cached
    pub enabled: bool,

    /// Maximum cached queries
    pub max_entries: u64,

    /// Time to live per entry (e.g. "1h")
    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Cache key: the same query with different caps is a different entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    provider: String,
    query: String,
    results_per_query: usize,
    max_characters: usize,
}

impl CacheKey {
    pub fn new(provider: &str, query: &str, options: &SearchOptions) -> Self {
        Self {
            provider: provider.to_string(),
            query: query.trim().to_string(),
            results_per_query: options.results_per_query,
            max_characters: options.max_characters,
        }
    }
}

/// Search result cache using moka.
#[derive(Clone)]
pub struct EvidenceCache {
    cache: Cache<CacheKey, Arc<Vec<Evidence>>>,
}

impl EvidenceCache {
    /// Create a new cache with the given capacity and TTL.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Build from configuration; `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max_entries, config.ttl))
    }

    /// Get cached evidence.
    pub async fn get(&self, key: &CacheKey) -> Option<Arc<Vec<Evidence>>> {
        self.cache.get(key).await
    }

    /// Store evidence for a query.
    pub async fn insert(&self, key: CacheKey, evidence: Vec<Evidence>) {
        self.cache.insert(key, Arc::new(evidence)).await;
    }

    /// Clear the cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for EvidenceCache {
    fn default() -> Self {
        let config = CacheConfig::default();
        Self::new(config.max_entries, config.ttl)
    }
}

impl std::fmt::Debug for EvidenceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidenceCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}
