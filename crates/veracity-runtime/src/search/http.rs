//! Shared HTTP plumbing for the search adapters.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::SearchError;

/// Build the shared client for an adapter.
pub(super) fn client() -> Result<reqwest::Client, SearchError> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| SearchError::Http(e.to_string()))
}

/// POST `body` as JSON and decode the response.
pub(super) async fn post_json<B, R>(
    request: reqwest::RequestBuilder,
    body: &B,
) -> Result<R, SearchError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| SearchError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());
        return Err(SearchError::Api {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<R>()
        .await
        .map_err(|e| SearchError::Parse(e.to_string()))
}

/// Optional `base_url` override, validated.
pub(super) fn base_url(config: &JsonValue, default: &str) -> Result<String, SearchError> {
    match config.get("base_url").and_then(JsonValue::as_str) {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
            Ok(url.trim_end_matches('/').to_string())
        }
        Some(_) => Err(SearchError::NotConfigured(
            "base_url must start with http:// or https://".to_string(),
        )),
        None => Ok(default.to_string()),
    }
}
