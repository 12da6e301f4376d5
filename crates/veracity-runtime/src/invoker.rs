//! Structured model invocation with bounded retry and consensus voting.
//!
//! `invoke` never raises: every exhausted path returns `None`, which the
//! verdict builder turns into an Insufficient Information verdict.

use backon::{ExponentialBuilder, Retryable};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use veracity_core::{aggregate, ConsensusOutcome, EvaluationOutput, OutputError, OutputSchema};

use crate::config::InvokerConfig;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use crate::resilience::UsageTracker;

/// Why a single attempt produced nothing usable.
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

impl InvokeError {
    /// Whether another attempt with the same input could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            InvokeError::Provider(e) => e.is_transient(),
            InvokeError::Output(OutputError::InvalidSchema { .. }) => false,
            InvokeError::Output(_) => true,
        }
    }
}

/// Issues schema-constrained model calls.
pub struct StructuredInvoker {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    config: InvokerConfig,
    usage: Arc<UsageTracker>,
}

impl StructuredInvoker {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        completion: CompletionConfig,
        config: InvokerConfig,
    ) -> Self {
        Self {
            provider,
            completion,
            config,
            usage: Arc::new(UsageTracker::new()),
        }
    }

    /// Share a usage tracker with other components.
    pub fn with_usage_tracker(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.config.retry_min_delay)
            .with_max_delay(self.config.retry_max_delay)
            .with_max_times(self.config.max_attempts.saturating_sub(1) as usize)
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        messages: &[ChatMessage],
        schema: &OutputSchema,
    ) -> Result<T, InvokeError> {
        let provider = self.provider.name();
        let config = self.completion.with_schema(schema);

        let call = self.provider.complete(messages.to_vec(), &config);
        let response = match tokio::time::timeout(config.timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.usage.record_failure(provider);
                return Err(e.into());
            }
            Err(_) => {
                self.usage.record_failure(provider);
                return Err(ProviderError::Timeout(config.timeout).into());
            }
        };

        self.usage.record(provider, &response.usage, &response.model);

        schema.parse(&response.content).map_err(|e| {
            self.usage.record_invalid_output(provider);
            e.into()
        })
    }

    /// One structured call, retried within the attempt bound.
    ///
    /// Returns `None` once every attempt failed or a non-retryable error
    /// occurred.
    pub async fn invoke<T: DeserializeOwned>(
        &self,
        messages: Vec<ChatMessage>,
        schema: &OutputSchema,
    ) -> Option<T> {
        let messages = messages.as_slice();
        let provider = self.provider.name();

        let result = (|| async move { self.attempt::<T>(messages, schema).await })
            .retry(self.backoff())
            .sleep(tokio::time::sleep)
            .when(InvokeError::is_retryable)
            .notify(|e: &InvokeError, delay: Duration| {
                if let InvokeError::Provider(ProviderError::RateLimited {
                    retry_after: Some(hint),
                }) = e
                {
                    tracing::debug!(provider, retry_after = ?hint, "Provider asked to slow down");
                }
                tracing::debug!(
                    provider,
                    schema = schema.name(),
                    error = %e,
                    ?delay,
                    "Retrying model call"
                );
            })
            .await;

        match result {
            Ok(output) => Some(output),
            Err(e) => {
                tracing::warn!(
                    provider,
                    schema = schema.name(),
                    max_attempts = self.config.max_attempts,
                    error = %e,
                    "Model call produced no usable response"
                );
                None
            }
        }
    }

    /// Evaluate with `samples` independent calls and aggregate by plurality.
    ///
    /// Every sample must satisfy `schema` and deserialize into an
    /// [`EvaluationOutput`]. Samples run concurrently; each is bounded by
    /// the sample timeout. Failed or timed-out samples are excluded.
    /// Returns `None` when no sample succeeded.
    pub async fn invoke_with_consensus(
        &self,
        messages: Vec<ChatMessage>,
        schema: &OutputSchema,
        samples: usize,
    ) -> Option<ConsensusOutcome> {
        let timeout = self.config.sample_timeout;

        let calls = (0..samples).map(|sample| {
            let messages = messages.clone();
            async move {
                let call = self.invoke::<EvaluationOutput>(messages, schema);
                match tokio::time::timeout(timeout, call).await {
                    Ok(output) => output,
                    Err(_) => {
                        tracing::warn!(
                            sample,
                            ?timeout,
                            "Consensus sample timed out, excluding it from the vote"
                        );
                        None
                    }
                }
            }
        });

        let completed: Vec<EvaluationOutput> =
            join_all(calls).await.into_iter().flatten().collect();
        tracing::debug!(
            requested = samples,
            completed = completed.len(),
            "Consensus samples collected"
        );

        aggregate(&completed)
    }

    /// Evaluate once, or by consensus when more than one sample is configured.
    pub async fn evaluate(&self, messages: Vec<ChatMessage>) -> Option<EvaluationOutput> {
        let schema = match EvaluationOutput::schema() {
            Ok(schema) => schema,
            Err(e) => {
                tracing::error!(error = %e, "Evaluation schema failed to compile");
                return None;
            }
        };

        if self.config.consensus_samples > 1 {
            return self
                .invoke_with_consensus(messages, schema, self.config.consensus_samples)
                .await
                .map(|outcome| outcome.output);
        }
        self.invoke(messages, schema).await
    }
}

impl std::fmt::Debug for StructuredInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredInvoker")
            .field("provider", &self.provider.name())
            .field("model", &self.completion.model)
            .field("config", &self.config)
            .finish()
    }
}
