//! Anthropic Messages API provider.
//!
//! Structured output is obtained with a forced tool call: the response
//! schema becomes the tool's `input_schema` and `tool_choice` names that
//! tool, so the model must answer with a JSON object of that shape.

use super::{
    factory::ProviderFactory,
    retry_after,
    secrets::{ApiCredential, CredentialSource},
    status_error, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    Role, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Environment variable name for the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicProvider {
    /// Create a provider with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                "Anthropic API key",
            ),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from JSON options (`api_key`, `base_url`) with environment fallback.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            ANTHROPIC_API_KEY_ENV,
            "Anthropic API key",
        )?;

        let base_url = config["base_url"]
            .as_str()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        Ok(Self {
            credential,
            base_url,
            client,
        })
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: Role,
    content: String,
}

#[derive(Debug, Serialize)]
struct ToolDefinition {
    name: String,
    description: String,
    input_schema: JsonValue,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    type_: &'static str,
    name: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { input: JsonValue },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn build_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> MessagesRequest {
    let mut system: Option<String> = None;
    let mut api_messages = Vec::with_capacity(messages.len());
    for msg in messages {
        if msg.role == Role::System {
            system = Some(match system {
                Some(prev) => format!("{}\n\n{}", prev, msg.content),
                None => msg.content,
            });
        } else {
            api_messages.push(ApiMessage {
                role: msg.role,
                content: msg.content,
            });
        }
    }

    let (tools, tool_choice) = match &config.response_schema {
        Some(schema) => (
            vec![ToolDefinition {
                name: schema.name().to_string(),
                description: format!("Record the {} result.", schema.name().replace('_', " ")),
                input_schema: schema.json_schema().clone(),
            }],
            Some(ToolChoice {
                type_: "tool",
                name: schema.name().to_string(),
            }),
        ),
        None => (Vec::new(), None),
    };

    MessagesRequest {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        system,
        messages: api_messages,
        temperature: config.temperature,
        tools,
        tool_choice,
    }
}

/// Tool input wins over text; with a forced tool call the input is the answer.
fn response_content(blocks: Vec<ContentBlock>) -> String {
    let mut text = String::new();
    for block in blocks {
        match block {
            ContentBlock::ToolUse { input } => return input.to_string(),
            ContentBlock::Text { text: t } => text.push_str(&t),
            ContentBlock::Other => {}
        }
    }
    text
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = build_request(messages, config);

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry = retry_after(response.headers());
            let message = match response.json::<ApiError>().await {
                Ok(body) => body.error.message,
                Err(_) => status.to_string(),
            };
            return Err(status_error(status.as_u16(), retry, message));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(CompletionResponse {
            content: response_content(body.content),
            usage: TokenUsage {
                prompt_tokens: body.usage.input_tokens,
                completion_tokens: body.usage.output_tokens,
            },
            model: body.model,
            stop_reason: body.stop_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.expose().is_empty()
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Factory for Anthropic providers.
///
/// ## Options
/// ```json
/// {
///   "api_key": "sk-ant-...",     // Optional, falls back to ANTHROPIC_API_KEY
///   "base_url": "https://..."    // Optional, custom API endpoint
/// }
/// ```
pub struct AnthropicProviderFactory;

impl ProviderFactory for AnthropicProviderFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.validate_config(config)?;
        Ok(Arc::new(AnthropicProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", ANTHROPIC_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Anthropic API key required: set 'api_key' in config or {} env",
                ANTHROPIC_API_KEY_ENV
            )));
        }

        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({ "base_url": DEFAULT_BASE_URL })
    }

    fn description(&self) -> &'static str {
        "Anthropic Claude with structured output via forced tool calls"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veracity_core::EvaluationOutput;

    #[test]
    fn test_request_forces_schema_tool() {
        let config = CompletionConfig::default().with_schema(EvaluationOutput::schema().unwrap());
        let request = build_request(
            vec![ChatMessage::system("Be strict."), ChatMessage::user("Claim: x")],
            &config,
        );

        assert_eq!(request.system.as_deref(), Some("Be strict."));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.tools[0].name, "evidence_evaluation");
        assert_eq!(request.tools[0].input_schema["required"][0], "verdict");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tool_choice"]["type"], "tool");
        assert_eq!(json["tool_choice"]["name"], "evidence_evaluation");
    }

    #[test]
    fn test_request_without_schema_has_no_tools() {
        let request = build_request(vec![ChatMessage::user("hi")], &CompletionConfig::default());

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_tool_input_becomes_content() {
        let body: MessagesResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "Recording result."},
                {"type": "tool_use", "id": "t1", "name": "evidence_evaluation",
                 "input": {"verdict": "Supported", "reasoning": "r",
                           "influential_source_indices": [1]}}
            ],
            "model": "claude",
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }))
        .unwrap();

        let content = response_content(body.content);
        let out: EvaluationOutput = EvaluationOutput::schema().unwrap().parse(&content).unwrap();
        assert_eq!(out.verdict, "Supported");
    }

    #[test]
    fn test_factory_validate_invalid_base_url() {
        let config = serde_json::json!({
            "api_key": "test-key",
            "base_url": "invalid-url"
        });
        assert!(AnthropicProviderFactory.validate_config(&config).is_err());
    }

    #[test]
    fn test_from_config_with_api_key() {
        let config = serde_json::json!({
            "api_key": "config-api-key",
            "base_url": "https://custom.api.com/v1/"
        });

        let provider = AnthropicProvider::from_config(&config).unwrap();
        assert_eq!(provider.base_url, "https://custom.api.com/v1");
        assert_eq!(provider.credential.source(), CredentialSource::Config);
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "sk-ant-REDACTED";
        let provider = AnthropicProvider::new(secret_key);

        let debug_output = format!("{:?}", provider);
        assert!(!debug_output.contains(secret_key), "API key was exposed in Debug output!");
        assert!(debug_output.contains("[REDACTED]"));
    }
}
