//! Serper (Google results) search adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use veracity_core::Evidence;

use super::http;
use super::{SearchError, SearchOptions, SearchProvider, SearchProviderFactory};
use crate::providers::ApiCredential;

/// Environment variable name for the Serper API key.
pub const SERPER_API_KEY_ENV: &str = "SERPER_API_KEY";

const DEFAULT_BASE_URL: &str = "https://google.serper.dev";

/// Serper search provider.
pub struct SerperProvider {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for SerperProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerperProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl SerperProvider {
    /// Create from JSON options (`api_key`, `base_url`).
    pub fn from_config(config: &JsonValue) -> Result<Self, SearchError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            SERPER_API_KEY_ENV,
            "Serper API key",
        )?;

        Ok(Self {
            credential,
            base_url: http::base_url(config, DEFAULT_BASE_URL)?,
            client: http::client()?,
        })
    }
}

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: String,
}

impl From<OrganicResult> for Evidence {
    fn from(result: OrganicResult) -> Self {
        let evidence = Evidence::new(result.link, result.snippet);
        match result.title {
            Some(title) => evidence.with_title(title),
            None => evidence,
        }
    }
}

#[async_trait]
impl SearchProvider for SerperProvider {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<Evidence>, SearchError> {
        let body = SerperRequest {
            q: query,
            num: options.results_per_query,
        };

        let request = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("X-API-KEY", self.credential.expose());

        let response: SerperResponse = http::post_json(request, &body).await?;
        Ok(response.organic.into_iter().map(Evidence::from).collect())
    }

    fn name(&self) -> &str {
        "serper"
    }
}

/// Factory for Serper providers.
pub struct SerperProviderFactory;

impl SearchProviderFactory for SerperProviderFactory {
    fn provider_type(&self) -> &'static str {
        "serper"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn SearchProvider>, SearchError> {
        Ok(Arc::new(SerperProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), SearchError> {
        if !ApiCredential::is_available(config, "api_key", SERPER_API_KEY_ENV) {
            return Err(SearchError::NotConfigured(format!(
                "Serper API key required: set 'api_key' in search options or {} env",
                SERPER_API_KEY_ENV
            )));
        }
        http::base_url(config, DEFAULT_BASE_URL).map(|_| ())
    }

    fn description(&self) -> &'static str {
        "Serper Google search results"
    }
}
