//! # veracity-runtime
//!
//! Async side of claim verification: web search, structured model calls
//! and the workflow driver.
//!
//! `veracity-core` decides; this crate fetches. Every external call made
//! during verification happens here, behind one of two traits:
//! [`SearchProvider`] for evidence and [`LlmProvider`] for the model.
//!
//! ## Failure model
//!
//! Verification always ends in a well-formed
//! [`Verdict`](veracity_core::Verdict). Search failures become empty
//! evidence, unusable model output becomes an Insufficient Information
//! verdict, and retries are bounded. The only errors returned from
//! `verify*` are cancellation and configuration errors.
//!
//! ## Example
//!
//! ```rust,ignore
//! use veracity_runtime::{ClaimVerifier, ProviderRegistry, RuntimeConfig, SearchRegistry};
//! use veracity_core::Claim;
//!
//! let config = RuntimeConfig::from_file("veracity.yaml")?;
//! let verifier = ClaimVerifier::from_config(
//!     &config,
//!     &ProviderRegistry::with_defaults(),
//!     &SearchRegistry::with_defaults(),
//! )?;
//!
//! let verdict = verifier.verify(Claim::new("The Eiffel Tower is 330 meters tall.")).await?;
//! println!("{}: {}", verdict.result, verdict.reasoning);
//! ```

use thiserror::Error;

pub mod cache;
pub mod config;
pub mod invoker;
pub mod persistence;
pub mod prompts;
pub mod providers;
pub mod query;
pub mod registry;
pub mod resilience;
pub mod search;
pub mod store;
pub mod verifier;

pub use cache::{CacheConfig, CacheKey, EvidenceCache};
pub use config::{
    ConfigError, InvokerConfig, ModelConfig, RuntimeConfig, SearchConfig, WorkflowConfig,
};
pub use invoker::{InvokeError, StructuredInvoker};
pub use persistence::{Checkpointer, MemoryCheckpointer, PersistenceError};
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, ProviderFactory,
    ProviderRegistry, Role, TokenUsage,
};
pub use query::{ClaimTextQueryGenerator, LlmQueryGenerator, QueryGenerator};
pub use registry::{Registered, Registry, UnknownName};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, LlmUsage, UsageTracker};
pub use search::{
    EvidenceRetriever, SearchError, SearchOptions, SearchProvider, SearchProviderFactory,
    SearchRegistry,
};
pub use store::{StoreError, VerdictStore};
pub use verifier::{thread_id, BatchOutcome, ClaimVerifier, ClaimVerifierBuilder};

use veracity_core::TransitionError;

/// Errors from building or running a verifier.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Verification cancelled before a verdict was reached")]
    Cancelled,

    #[error("Verifier not configured: {0}")]
    NotConfigured(String),

    #[error("Workflow finished without a verdict")]
    MissingVerdict,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] TransitionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
