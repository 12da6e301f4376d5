//! Search query generation.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use veracity_core::{Claim, Evidence, QueryOutput};

use crate::invoker::StructuredInvoker;
use crate::prompts;

/// Produces the next search query for a claim.
///
/// `prior_evidence` is the evidence the workflow still holds (empty on the
/// first attempt and after a retry cleared it). `previous_query` is the
/// query of the attempt that just failed to reach a verdict. `None` means
/// no query could be produced; retrieval then yields no evidence.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn generate(
        &self,
        claim: &Claim,
        prior_evidence: &[Evidence],
        previous_query: Option<&str>,
        retry_count: u32,
    ) -> Option<String>;
}

fn non_blank(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Uses the claim itself as the query.
///
/// Prefers the disambiguated sentence, falling back to the claim text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimTextQueryGenerator;

#[async_trait]
impl QueryGenerator for ClaimTextQueryGenerator {
    async fn generate(
        &self,
        claim: &Claim,
        _prior_evidence: &[Evidence],
        _previous_query: Option<&str>,
        _retry_count: u32,
    ) -> Option<String> {
        non_blank(&claim.disambiguated_sentence).or_else(|| non_blank(&claim.claim_text))
    }
}

/// Asks the model for a query, falling back to the claim text.
#[derive(Debug, Clone)]
pub struct LlmQueryGenerator {
    invoker: Arc<StructuredInvoker>,
}

impl LlmQueryGenerator {
    pub fn new(invoker: Arc<StructuredInvoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl QueryGenerator for LlmQueryGenerator {
    async fn generate(
        &self,
        claim: &Claim,
        prior_evidence: &[Evidence],
        previous_query: Option<&str>,
        retry_count: u32,
    ) -> Option<String> {
        let schema = match QueryOutput::schema() {
            Ok(schema) => schema,
            Err(e) => {
                tracing::error!(error = %e, "Query schema failed to compile");
                return non_blank(&claim.claim_text);
            }
        };

        let messages =
            prompts::query_messages(claim, prior_evidence, previous_query, retry_count, Utc::now());
        let generated = self
            .invoker
            .invoke::<QueryOutput>(messages, schema)
            .await
            .and_then(|output| non_blank(&output.query));

        match generated {
            Some(query) => {
                tracing::debug!(
                    claim = %claim.claim_text,
                    retry_count,
                    query = %query,
                    "Generated search query"
                );
                Some(query)
            }
            None => {
                tracing::warn!(
                    claim = %claim.claim_text,
                    retry_count,
                    "Query generation failed, searching for the claim text"
                );
                non_blank(&claim.claim_text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InvokerConfig;
    use crate::providers::{
        ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
    };
    use parking_lot::Mutex;

    struct FixedModel {
        reply: &'static str,
        last_prompt: Mutex<Option<String>>,
    }

    #[async_trait]
    impl LlmProvider for FixedModel {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            assert_eq!(messages.len(), 2);
            *self.last_prompt.lock() = Some(messages[1].content.clone());
            Ok(CompletionResponse {
                content: self.reply.to_string(),
                usage: TokenUsage::default(),
                model: "test".to_string(),
                stop_reason: None,
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn llm_generator(reply: &'static str) -> (LlmQueryGenerator, Arc<FixedModel>) {
        let model = Arc::new(FixedModel {
            reply,
            last_prompt: Mutex::new(None),
        });
        let invoker = StructuredInvoker::new(
            model.clone(),
            CompletionConfig::default(),
            InvokerConfig {
                max_attempts: 1,
                ..Default::default()
            },
        );
        (LlmQueryGenerator::new(Arc::new(invoker)), model)
    }

    #[tokio::test]
    async fn test_claim_text_prefers_disambiguated_sentence() {
        let claim = Claim::new("It is 330 meters tall.").with_source(
            "It is 330 meters tall.",
            "The Eiffel Tower is 330 meters tall.",
            0,
        );

        let query = ClaimTextQueryGenerator.generate(&claim, &[], None, 0).await;
        assert_eq!(query.as_deref(), Some("The Eiffel Tower is 330 meters tall."));
    }

    #[tokio::test]
    async fn test_claim_text_blank_claim_is_none() {
        let claim = Claim::new("  ").with_source("", " ", 0);
        assert!(ClaimTextQueryGenerator.generate(&claim, &[], None, 0).await.is_none());
    }

    #[tokio::test]
    async fn test_llm_query_used() {
        let (generator, _) = llm_generator(r#"{"query": "Eiffel Tower height meters"}"#);
        let query = generator.generate(&Claim::new("c"), &[], None, 0).await;
        assert_eq!(query.as_deref(), Some("Eiffel Tower height meters"));
    }

    #[tokio::test]
    async fn test_retry_prompt_names_previous_query() {
        let (generator, model) = llm_generator(r#"{"query": "Eiffel Tower antenna height"}"#);

        generator
            .generate(&Claim::new("c"), &[], Some("Eiffel Tower height"), 2)
            .await;

        let prompt = model.last_prompt.lock().clone().unwrap();
        assert!(prompt.contains("Previous query: Eiffel Tower height"));
        assert!(prompt.contains("Attempt: 3"));
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_to_claim() {
        let (generator, _) = llm_generator("no json here");
        let query = generator
            .generate(&Claim::new("The sky is blue."), &[], Some("sky"), 1)
            .await;
        assert_eq!(query.as_deref(), Some("The sky is blue."));
    }

    #[tokio::test]
    async fn test_llm_blank_query_falls_back_to_claim() {
        let (generator, _) = llm_generator(r#"{"query": "   "}"#);
        let query = generator.generate(&Claim::new("The sky is blue."), &[], None, 0).await;
        assert_eq!(query.as_deref(), Some("The sky is blue."));
    }
}
