//! Tavily search adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use veracity_core::Evidence;

use super::http;
use super::{SearchError, SearchOptions, SearchProvider, SearchProviderFactory};
use crate::providers::ApiCredential;

/// Environment variable name for the Tavily API key.
pub const TAVILY_API_KEY_ENV: &str = "TAVILY_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

/// Tavily search provider.
pub struct TavilyProvider {
    credential: ApiCredential,
    base_url: String,
    search_depth: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for TavilyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("search_depth", &self.search_depth)
            .finish()
    }
}

impl TavilyProvider {
    /// Create from JSON options (`api_key`, `base_url`, `search_depth`).
    pub fn from_config(config: &JsonValue) -> Result<Self, SearchError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            TAVILY_API_KEY_ENV,
            "Tavily API key",
        )?;

        Ok(Self {
            credential,
            base_url: http::base_url(config, DEFAULT_BASE_URL)?,
            search_depth: config["search_depth"].as_str().unwrap_or("basic").to_string(),
            client: http::client()?,
        })
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: String,
}

impl From<TavilyResult> for Evidence {
    fn from(result: TavilyResult) -> Self {
        let evidence = Evidence::new(result.url, result.content);
        match result.title {
            Some(title) => evidence.with_title(title),
            None => evidence,
        }
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<Evidence>, SearchError> {
        let body = TavilyRequest {
            query,
            max_results: options.results_per_query,
            search_depth: &self.search_depth,
        };

        let request = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(self.credential.expose());

        let response: TavilyResponse = http::post_json(request, &body).await?;
        Ok(response.results.into_iter().map(Evidence::from).collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

/// Factory for Tavily providers.
pub struct TavilyProviderFactory;

impl SearchProviderFactory for TavilyProviderFactory {
    fn provider_type(&self) -> &'static str {
        "tavily"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn SearchProvider>, SearchError> {
        Ok(Arc::new(TavilyProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), SearchError> {
        if !ApiCredential::is_available(config, "api_key", TAVILY_API_KEY_ENV) {
            return Err(SearchError::NotConfigured(format!(
                "Tavily API key required: set 'api_key' in search options or {} env",
                TAVILY_API_KEY_ENV
            )));
        }
        http::base_url(config, DEFAULT_BASE_URL).map(|_| ())
    }

    fn description(&self) -> &'static str {
        "Tavily web search"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_normalized() {
        let response: TavilyResponse = serde_json::from_value(serde_json::json!({
            "query": "q",
            "results": [
                {"url": "https://a", "title": "A", "content": "Snippet A", "score": 0.9},
                {"url": "https://b", "content": "Snippet B"}
            ]
        }))
        .unwrap();

        let evidence: Vec<Evidence> = response.results.into_iter().map(Evidence::from).collect();
        assert_eq!(evidence[0], Evidence::new("https://a", "Snippet A").with_title("A"));
        assert!(evidence[1].title.is_none());
    }

    #[test]
    fn test_missing_results_is_empty() {
        let response: TavilyResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(response.results.is_empty());
    }
}
