//! Exa neural search adapter.
//!
//! Exa can return both page text and query-relevant highlights. Joined
//! highlights are preferred because they are denser evidence; page text is
//! the fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use veracity_core::Evidence;

use super::http;
use super::{SearchError, SearchOptions, SearchProvider, SearchProviderFactory};
use crate::providers::ApiCredential;

/// Environment variable name for the Exa API key.
pub const EXA_API_KEY_ENV: &str = "EXA_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.exa.ai";

/// Exa search provider.
pub struct ExaProvider {
    credential: ApiCredential,
    base_url: String,
    search_type: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for ExaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExaProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("search_type", &self.search_type)
            .finish()
    }
}

impl ExaProvider {
    /// Create from JSON options (`api_key`, `base_url`, `search_type`).
    pub fn from_config(config: &JsonValue) -> Result<Self, SearchError> {
        let credential =
            ApiCredential::from_config_or_env(config, "api_key", EXA_API_KEY_ENV, "Exa API key")?;

        Ok(Self {
            credential,
            base_url: http::base_url(config, DEFAULT_BASE_URL)?,
            search_type: config["search_type"].as_str().unwrap_or("neural").to_string(),
            client: http::client()?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaRequest<'a> {
    query: &'a str,
    num_results: usize,
    #[serde(rename = "type")]
    search_type: &'a str,
    contents: ExaContents,
}

#[derive(Debug, Serialize)]
struct ExaContents {
    text: ExaTextOptions,
    highlights: ExaHighlightOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaTextOptions {
    max_characters: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaHighlightOptions {
    num_sentences: u32,
    highlights_per_url: u32,
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
struct ExaResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    highlights: Vec<String>,
}

impl From<ExaResult> for Evidence {
    fn from(result: ExaResult) -> Self {
        let text = if result.highlights.is_empty() {
            result.text.unwrap_or_default()
        } else {
            result.highlights.join(" ")
        };
        let evidence = Evidence::new(result.url, text);
        match result.title {
            Some(title) => evidence.with_title(title),
            None => evidence,
        }
    }
}

#[async_trait]
impl SearchProvider for ExaProvider {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<Evidence>, SearchError> {
        let body = ExaRequest {
            query,
            num_results: options.results_per_query,
            search_type: &self.search_type,
            contents: ExaContents {
                text: ExaTextOptions {
                    max_characters: options.max_characters,
                },
                highlights: ExaHighlightOptions {
                    num_sentences: 3,
                    highlights_per_url: 1,
                },
            },
        };

        let request = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("x-api-key", self.credential.expose());

        let response: ExaResponse = http::post_json(request, &body).await?;
        Ok(response.results.into_iter().map(Evidence::from).collect())
    }

    fn name(&self) -> &str {
        "exa"
    }
}

/// Factory for Exa providers.
pub struct ExaProviderFactory;

impl SearchProviderFactory for ExaProviderFactory {
    fn provider_type(&self) -> &'static str {
        "exa"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn SearchProvider>, SearchError> {
        Ok(Arc::new(ExaProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), SearchError> {
        if !ApiCredential::is_available(config, "api_key", EXA_API_KEY_ENV) {
            return Err(SearchError::NotConfigured(format!(
                "Exa API key required: set 'api_key' in search options or {} env",
                EXA_API_KEY_ENV
            )));
        }
        http::base_url(config, DEFAULT_BASE_URL).map(|_| ())
    }

    fn description(&self) -> &'static str {
        "Exa neural web search with highlights"
    }
}
