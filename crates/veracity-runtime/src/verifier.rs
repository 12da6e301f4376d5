//! The claim verification driver.
//!
//! `ClaimVerifier` runs the workflow for one claim at a time:
//!
//! ```text
//! GENERATE_QUERY -> RETRIEVE -> EVALUATE -> DONE
//!        ^                         |
//!        +---- insufficient -------+   (while retry_count < max_retries)
//! ```
//!
//! Each step performs its I/O, turns the outcome into an [`Event`] and
//! hands it to the pure transition function in `veracity-core`. State is
//! owned by the running task; nothing is shared between claims except the
//! providers, the circuit breaker, the cache and the usage tracker.
//!
//! Only the first attempt of a claim may be answered from the search
//! cache. Retries always search again.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use veracity_core::{
    Claim, Event, EvidenceBudgeter, Step, Verdict, VerdictBuilder, WorkflowPolicy, WorkflowState,
};

use crate::cache::EvidenceCache;
use crate::config::RuntimeConfig;
use crate::invoker::StructuredInvoker;
use crate::persistence::Checkpointer;
use crate::prompts;
use crate::providers::ProviderRegistry;
use crate::query::{ClaimTextQueryGenerator, LlmQueryGenerator, QueryGenerator};
use crate::resilience::{CircuitBreaker, UsageTracker};
use crate::search::{EvidenceRetriever, SearchRegistry};
use crate::store::VerdictStore;
use crate::RuntimeError;

/// Outcome of verifying a batch of claims.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Final verdicts by claim position
    pub verdicts: VerdictStore,

    /// Claims that ended without a verdict, by claim position
    pub errors: BTreeMap<usize, RuntimeError>,
}

/// Drives the verification workflow.
pub struct ClaimVerifier {
    query_generator: Arc<dyn QueryGenerator>,
    retriever: EvidenceRetriever,
    invoker: Arc<StructuredInvoker>,
    budgeter: EvidenceBudgeter,
    builder: VerdictBuilder,
    policy: WorkflowPolicy,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    keep_finished: bool,
}

/// Checkpoint thread id for a claim.
///
/// The source position plus a digest of the claim and its sentence, so
/// claims built with [`Claim::new`] (all at position 0) still get distinct
/// threads. The id is stable across processes.
pub fn thread_id(claim: &Claim) -> String {
    let mut hasher = Sha256::new();
    hasher.update(claim.claim_text.as_bytes());
    hasher.update([0u8]);
    hasher.update(claim.original_sentence.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("claim-{}-{}", claim.original_index, &digest[..16])
}

impl ClaimVerifier {
    pub fn builder() -> ClaimVerifierBuilder {
        ClaimVerifierBuilder::new()
    }

    /// Build a verifier from configuration, resolving providers by name.
    ///
    /// Queries are generated by the model. Provider names and options are
    /// resolved once here, never per call.
    pub fn from_config(
        config: &RuntimeConfig,
        providers: &ProviderRegistry,
        searches: &SearchRegistry,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let llm = providers.create(&config.model.llm_provider, &config.model.options)?;
        let search = searches.create(&config.search.search_provider, &config.search.options)?;

        let mut retriever = EvidenceRetriever::new(search)
            .with_options(config.search.search_options())
            .with_timeout(config.search.timeout)
            .with_circuit_breaker(Arc::new(CircuitBreaker::new(
                config.circuit_breaker.clone(),
            )));
        if let Some(cache) = EvidenceCache::from_config(&config.cache) {
            retriever = retriever.with_cache(cache);
        }

        let invoker = Arc::new(StructuredInvoker::new(
            llm,
            config.model.completion_config(),
            config.invoker.clone(),
        ));

        tracing::info!(
            llm_provider = %config.model.llm_provider,
            model = %config.model.model,
            search_provider = %config.search.search_provider,
            consensus_samples = config.invoker.consensus_samples,
            max_retries = config.workflow.max_retries,
            "Claim verifier configured"
        );

        ClaimVerifier::builder()
            .query_generator(Arc::new(LlmQueryGenerator::new(Arc::clone(&invoker))))
            .retriever(retriever)
            .invoker(invoker)
            .token_budget(config.workflow.token_budget)
            .policy(config.workflow.policy())
            .build()
    }

    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    /// Usage of every model call made by this verifier.
    pub fn usage(&self) -> &Arc<UsageTracker> {
        self.invoker.usage()
    }

    /// Perform one step of the workflow and apply its transition.
    ///
    /// Returns the step the workflow moved to. Calling `step` on a finished
    /// workflow is an error.
    pub async fn step(&self, state: &mut WorkflowState) -> Result<Step, RuntimeError> {
        let event = match state.step {
            Step::GenerateQuery => {
                let query = self
                    .query_generator
                    .generate(
                        &state.claim,
                        &state.evidence,
                        state.query.as_deref(),
                        state.retry_count,
                    )
                    .await;
                Event::QueryGenerated(query)
            }
            Step::Retrieve => {
                let raw = if state.attempts == 0 {
                    self.retriever.retrieve(state.query.as_deref()).await
                } else {
                    self.retriever.retrieve_fresh(state.query.as_deref()).await
                };
                let now = state.prompt_time_or(Utc::now());
                let fixed = prompts::evaluation_fixed_text(&prompts::evaluation_system_prompt(now));
                let budgeted = self.budgeter.truncate(&raw, &state.claim.claim_text, &fixed);
                let report = &budgeted.report;
                if report.dropped_items() > 0 || report.truncated_first {
                    tracing::info!(
                        claim = %state.claim.claim_text,
                        kept = report.kept_items,
                        dropped = report.dropped_items(),
                        truncated_first = report.truncated_first,
                        estimated_tokens = report.estimated_tokens,
                        budget = self.budgeter.budget(),
                        "Evidence truncated to fit token budget"
                    );
                }
                Event::EvidenceRetrieved(budgeted.evidence)
            }
            Step::Evaluate => {
                let now = state.prompt_time_or(Utc::now());
                let system = prompts::evaluation_system_prompt(now);
                let messages = prompts::evaluation_messages(&system, &state.claim, &state.evidence);
                let output = self.invoker.evaluate(messages).await;
                let verdict = self.builder.build(&state.claim, &state.evidence, output.as_ref());
                Event::Evaluated(verdict)
            }
            Step::Done => return Err(veracity_core::TransitionError::AlreadyDone.into()),
        };

        let from = state.step;
        let to = state.advance(event, &self.policy)?;
        tracing::debug!(
            claim = %state.claim.claim_text,
            from = %from,
            to = %to,
            retry_count = state.retry_count,
            attempts = state.attempts,
            "Workflow transition"
        );
        Ok(to)
    }

    async fn checkpoint(&self, thread_id: &str, state: &WorkflowState) {
        if let Some(checkpointer) = &self.checkpointer {
            if let Err(e) = checkpointer.save(thread_id, state).await {
                tracing::warn!(thread_id, error = %e, "Failed to save workflow checkpoint");
            }
        }
    }

    async fn discard(&self, thread_id: &str) {
        if let Some(checkpointer) = &self.checkpointer {
            if let Err(e) = checkpointer.delete(thread_id).await {
                tracing::warn!(thread_id, error = %e, "Failed to delete finished checkpoint");
            }
        }
    }

    /// Run `state` to completion, checkpointing after every transition.
    ///
    /// The checkpoint is deleted once the verdict is reached, unless the
    /// verifier was built to keep finished checkpoints.
    pub async fn run(
        &self,
        mut state: WorkflowState,
        thread_id: &str,
    ) -> Result<Verdict, RuntimeError> {
        tracing::info!(claim = %state.claim.claim_text, thread_id, "Verifying claim");

        while !state.is_done() {
            self.step(&mut state).await?;
            if !state.is_done() || self.keep_finished {
                self.checkpoint(thread_id, &state).await;
            }
        }
        if !self.keep_finished {
            self.discard(thread_id).await;
        }

        let verdict = state.verdict.ok_or(RuntimeError::MissingVerdict)?;
        tracing::info!(
            claim = %verdict.claim_text,
            result = %verdict.result,
            sources = verdict.sources.len(),
            attempts = state.attempts,
            "Claim verified"
        );
        Ok(verdict)
    }

    /// Continue a checkpointed workflow. `Ok(None)` when nothing was saved
    /// for `thread_id`.
    pub async fn resume(&self, thread_id: &str) -> Result<Option<Verdict>, RuntimeError> {
        let Some(checkpointer) = &self.checkpointer else {
            return Ok(None);
        };
        match checkpointer.load(thread_id).await? {
            Some(state) => self.run(state, thread_id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Verify a claim, checkpointing under `thread_id`.
    pub async fn verify_thread(
        &self,
        claim: Claim,
        thread_id: &str,
    ) -> Result<Verdict, RuntimeError> {
        self.run(WorkflowState::new(claim), thread_id).await
    }

    /// Verify a claim, checkpointing under [`thread_id`]. Verifying the
    /// same claim twice at once needs distinct ids via
    /// [`verify_thread`](Self::verify_thread).
    pub async fn verify(&self, claim: Claim) -> Result<Verdict, RuntimeError> {
        let id = thread_id(&claim);
        self.verify_thread(claim, &id).await
    }

    /// Verify a claim unless `cancel` resolves first.
    ///
    /// A cancelled workflow yields [`RuntimeError::Cancelled`], never a
    /// partial verdict.
    pub async fn verify_until<F>(&self, claim: Claim, cancel: F) -> Result<Verdict, RuntimeError>
    where
        F: Future<Output = ()>,
    {
        let claim_text = claim.claim_text.clone();
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::warn!(
                    claim = %claim_text,
                    "Verification cancelled before a verdict was reached"
                );
                Err(RuntimeError::Cancelled)
            }
            result = self.verify(claim) => result,
        }
    }

    /// Verify a claim within `deadline`.
    pub async fn verify_with_deadline(
        &self,
        claim: Claim,
        deadline: Duration,
    ) -> Result<Verdict, RuntimeError> {
        self.verify_until(claim, tokio::time::sleep(deadline)).await
    }

    /// Verify many claims with at most `concurrency` workflows in flight.
    ///
    /// Results are keyed by position in `claims`. Checkpoints use the same
    /// [`thread_id`] as [`verify`](Self::verify); repeated claims in one
    /// batch get a `-{n}` suffix. Each claim gets its own deadline when one
    /// is given.
    pub async fn verify_all(
        &self,
        claims: Vec<Claim>,
        concurrency: usize,
        deadline: Option<Duration>,
    ) -> BatchOutcome {
        let total = claims.len();
        let mut outcome = BatchOutcome::default();

        let mut seen: HashMap<String, usize> = HashMap::new();
        let jobs: Vec<(usize, Claim, String)> = claims
            .into_iter()
            .enumerate()
            .map(|(index, claim)| {
                let base = thread_id(&claim);
                let repeats = seen.entry(base.clone()).or_insert(0);
                let id = match *repeats {
                    0 => base,
                    n => format!("{}-{}", base, n),
                };
                *repeats += 1;
                (index, claim, id)
            })
            .collect();

        let mut results = stream::iter(jobs)
            .map(|(index, claim, thread_id)| async move {
                let result = match deadline {
                    Some(deadline) => {
                        let cancel = tokio::time::sleep(deadline);
                        let claim_text = claim.claim_text.clone();
                        tokio::select! {
                            biased;
                            _ = cancel => {
                                tracing::warn!(
                                    claim = %claim_text,
                                    index,
                                    "Verification deadline passed"
                                );
                                Err(RuntimeError::Cancelled)
                            }
                            result = self.verify_thread(claim, &thread_id) => result,
                        }
                    }
                    None => self.verify_thread(claim, &thread_id).await,
                };
                (index, result)
            })
            .buffer_unordered(concurrency.max(1));

        while let Some((index, result)) = results.next().await {
            match result {
                Ok(verdict) => {
                    if let Err(e) = outcome.verdicts.insert(index, verdict) {
                        outcome.errors.insert(index, e.into());
                    }
                }
                Err(e) => {
                    outcome.errors.insert(index, e);
                }
            }
        }

        tracing::info!(
            claims = total,
            verified = outcome.verdicts.len(),
            failed = outcome.errors.len(),
            "Batch verification finished"
        );
        outcome
    }
}

impl std::fmt::Debug for ClaimVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimVerifier")
            .field("retriever", &self.retriever)
            .field("invoker", &self.invoker)
            .field("budget", &self.budgeter.budget())
            .field("policy", &self.policy)
            .field("checkpointer", &self.checkpointer.is_some())
            .field("keep_finished", &self.keep_finished)
            .finish()
    }
}

/// Builder for [`ClaimVerifier`].
pub struct ClaimVerifierBuilder {
    query_generator: Option<Arc<dyn QueryGenerator>>,
    retriever: Option<EvidenceRetriever>,
    invoker: Option<Arc<StructuredInvoker>>,
    token_budget: usize,
    policy: WorkflowPolicy,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    keep_finished: bool,
}

impl ClaimVerifierBuilder {
    pub fn new() -> Self {
        Self {
            query_generator: None,
            retriever: None,
            invoker: None,
            token_budget: 8000,
            policy: WorkflowPolicy::default(),
            checkpointer: None,
            keep_finished: false,
        }
    }

    /// Set the query generator. Defaults to [`ClaimTextQueryGenerator`].
    pub fn query_generator(mut self, generator: Arc<dyn QueryGenerator>) -> Self {
        self.query_generator = Some(generator);
        self
    }

    pub fn retriever(mut self, retriever: EvidenceRetriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn invoker(mut self, invoker: Arc<StructuredInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn token_budget(mut self, budget: usize) -> Self {
        self.token_budget = budget;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    pub fn policy(mut self, policy: WorkflowPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Save workflow state after every transition.
    pub fn checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Keep the final state of finished workflows in the checkpointer.
    /// Off by default: a finished thread's state is deleted.
    pub fn keep_finished_checkpoints(mut self, keep: bool) -> Self {
        self.keep_finished = keep;
        self
    }

    pub fn build(self) -> Result<ClaimVerifier, RuntimeError> {
        let retriever = self
            .retriever
            .ok_or_else(|| RuntimeError::NotConfigured("No evidence retriever set".to_string()))?;
        let invoker = self
            .invoker
            .ok_or_else(|| RuntimeError::NotConfigured("No model invoker set".to_string()))?;

        Ok(ClaimVerifier {
            query_generator: self
                .query_generator
                .unwrap_or_else(|| Arc::new(ClaimTextQueryGenerator)),
            retriever,
            invoker,
            budgeter: EvidenceBudgeter::new(self.token_budget),
            builder: VerdictBuilder::new(),
            policy: self.policy,
            checkpointer: self.checkpointer,
            keep_finished: self.keep_finished,
        })
    }
}

impl Default for ClaimVerifierBuilder {
    fn default() -> Self {
        Self::new()
    }
}
