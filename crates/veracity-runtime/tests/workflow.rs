//! End-to-end verification runs against scripted providers.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use veracity_core::{
    Claim, Evidence, Step, VerificationResult, WorkflowState, EVALUATION_FAILED_REASONING,
};
use veracity_runtime::{
    CacheConfig, ChatMessage, ClaimVerifier, CompletionConfig, CompletionResponse, EvidenceCache,
    EvidenceRetriever, InvokerConfig, LlmProvider, ProviderError, RuntimeError, SearchError,
    SearchOptions, SearchProvider, StructuredInvoker, TokenUsage,
};

#[derive(Clone)]
enum Reply {
    Json(String),
    Hang,
}

fn evaluation(verdict: &str, indices: &[i64]) -> Reply {
    Reply::Json(
        serde_json::json!({
            "verdict": verdict,
            "reasoning": format!("{} per the evidence.", verdict),
            "influential_source_indices": indices,
        })
        .to_string(),
    )
}

/// Replies in call order, repeating the last reply.
struct ScriptedModel {
    script: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(script: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedModel {
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = {
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };

        match reply {
            Some(Reply::Json(content)) => Ok(CompletionResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 20,
                },
                model: "gpt-4o-mini".to_string(),
                stop_reason: Some("stop".to_string()),
            }),
            Some(Reply::Hang) | None => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::HttpError("never answered".to_string()))
            }
        }
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Returns the same evidence for every query, or fails.
struct FixedSearch {
    evidence: Option<Vec<Evidence>>,
    queries: Mutex<Vec<String>>,
}

impl FixedSearch {
    fn returning(evidence: Vec<Evidence>) -> Arc<Self> {
        Arc::new(Self {
            evidence: Some(evidence),
            queries: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            evidence: None,
            queries: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SearchProvider for FixedSearch {
    async fn search(
        &self,
        query: &str,
        _options: &SearchOptions,
    ) -> Result<Vec<Evidence>, SearchError> {
        self.queries.lock().push(query.to_string());
        match &self.evidence {
            Some(evidence) => Ok(evidence.clone()),
            None => Err(SearchError::Parse("malformed payload".to_string())),
        }
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

fn invoker(model: Arc<ScriptedModel>, samples: usize) -> Arc<StructuredInvoker> {
    Arc::new(StructuredInvoker::new(
        model,
        CompletionConfig::default(),
        InvokerConfig {
            max_attempts: 1,
            consensus_samples: samples,
            sample_timeout: Duration::from_secs(5),
            ..Default::default()
        },
    ))
}

fn verifier(
    search: Arc<FixedSearch>,
    model: Arc<ScriptedModel>,
    max_retries: u32,
    samples: usize,
) -> ClaimVerifier {
    ClaimVerifier::builder()
        .retriever(EvidenceRetriever::new(search))
        .invoker(invoker(model, samples))
        .max_retries(max_retries)
        .build()
        .unwrap()
}

async fn run_to_done(verifier: &ClaimVerifier, claim: Claim) -> WorkflowState {
    let mut state = WorkflowState::new(claim);
    while !state.is_done() {
        verifier.step(&mut state).await.unwrap();
    }
    state
}

#[tokio::test]
async fn eiffel_tower_is_supported_by_its_source() {
    let evidence = vec![Evidence::new("a", "The Eiffel Tower stands 330m including antennas.")];
    let model = ScriptedModel::new(vec![evaluation("Supported", &[1])]);
    let v = verifier(FixedSearch::returning(evidence.clone()), model, 3, 1);

    let verdict = v.verify(Claim::new("The Eiffel Tower is 330 meters tall.")).await.unwrap();

    assert_eq!(verdict.result, VerificationResult::Supported);
    assert_eq!(verdict.sources, vec![evidence[0].clone()]);
    assert_eq!(verdict.claim_text, "The Eiffel Tower is 330 meters tall.");
}

#[tokio::test]
async fn empty_evidence_ends_insufficient_after_retries() {
    let model = ScriptedModel::new(vec![evaluation("Insufficient Information", &[])]);
    let search = FixedSearch::returning(Vec::new());
    let v = verifier(search.clone(), model.clone(), 1, 1);

    let state = run_to_done(&v, Claim::new("Atlantis sank in 9600 BC.")).await;
    let verdict = state.final_verdict().unwrap();

    assert_eq!(verdict.result, VerificationResult::InsufficientInformation);
    assert!(verdict.sources.is_empty());
    assert_eq!(state.retry_count, 0);
    assert_eq!(state.attempts, 2);
    assert_eq!(model.calls(), 2);
    assert_eq!(search.queries.lock().len(), 2);
}

#[tokio::test]
async fn evaluations_never_exceed_max_retries_plus_one() {
    for max_retries in 0..4u32 {
        let model = ScriptedModel::new(vec![evaluation("Insufficient Information", &[1])]);
        let v = verifier(
            FixedSearch::returning(vec![Evidence::new("u", "vague")]),
            model.clone(),
            max_retries,
            1,
        );

        let state = run_to_done(&v, Claim::new("c")).await;

        assert_eq!(state.attempts, max_retries + 1);
        assert_eq!(model.calls(), (max_retries + 1) as usize);
        assert!(state.final_verdict().unwrap().is_insufficient());
    }
}

#[tokio::test]
async fn retry_reaches_supported_on_third_attempt() {
    let model = ScriptedModel::new(vec![
        evaluation("Insufficient Information", &[1]),
        evaluation("Insufficient Information", &[1]),
        evaluation("Supported", &[1]),
    ]);
    let evidence = vec![Evidence::new("u", "Confirmed.")];
    let v = verifier(FixedSearch::returning(evidence.clone()), model, 3, 1);

    let state = run_to_done(&v, Claim::new("c")).await;
    let verdict = state.final_verdict().unwrap();

    assert_eq!(verdict.result, VerificationResult::Supported);
    assert_eq!(verdict.sources, evidence);
    assert_eq!(state.retry_count, 0);
    assert_eq!(state.attempts, 3);
}

#[tokio::test]
async fn retry_clears_evidence_before_requery() {
    let model = ScriptedModel::new(vec![
        evaluation("Insufficient Information", &[]),
        evaluation("Refuted", &[1]),
    ]);
    let v = verifier(FixedSearch::returning(vec![Evidence::new("u", "No.")]), model, 2, 1);

    let mut state = WorkflowState::new(Claim::new("c"));
    for _ in 0..3 {
        v.step(&mut state).await.unwrap();
    }

    assert_eq!(state.step, Step::GenerateQuery);
    assert!(state.evidence.is_empty());
    assert!(state.verdict.is_none());
    assert_eq!(state.retry_count, 1);
}

#[tokio::test]
async fn every_retry_searches_again_with_cache_enabled() {
    let model = ScriptedModel::new(vec![evaluation("Insufficient Information", &[1])]);
    let search = FixedSearch::returning(vec![Evidence::new("u0", "vague")]);
    let cache = EvidenceCache::from_config(&CacheConfig::default()).unwrap();
    let v = ClaimVerifier::builder()
        .retriever(EvidenceRetriever::new(search.clone()).with_cache(cache))
        .invoker(invoker(model.clone(), 1))
        .max_retries(3)
        .build()
        .unwrap();

    let verdict = v.verify(Claim::new("The moon is 384,400 km away.")).await.unwrap();

    assert!(verdict.is_insufficient());
    assert_eq!(model.calls(), 4);
    assert_eq!(search.queries.lock().len(), 4);

    // A new claim with the same query may still reuse the first search.
    v.verify(Claim::new("The moon is 384,400 km away.")).await.unwrap();
    assert_eq!(search.queries.lock().len(), 7);
}

#[tokio::test]
async fn cited_sources_are_always_evaluated_evidence() {
    let evidence = vec![Evidence::new("a", "one"), Evidence::new("b", "two")];
    let model = ScriptedModel::new(vec![evaluation("Conflicting Evidence", &[0, 2, 2, 1, 99, -3])]);
    let v = verifier(FixedSearch::returning(evidence.clone()), model, 0, 1);

    let verdict = v.verify(Claim::new("c")).await.unwrap();

    assert_eq!(verdict.result, VerificationResult::ConflictingEvidence);
    assert_eq!(verdict.sources, vec![evidence[1].clone(), evidence[0].clone()]);
}

#[tokio::test]
async fn search_failure_still_yields_a_verdict() {
    let model = ScriptedModel::new(vec![evaluation("Insufficient Information", &[1])]);
    let v = verifier(FixedSearch::failing(), model, 0, 1);

    let verdict = v.verify(Claim::new("c")).await.unwrap();

    assert!(verdict.is_insufficient());
    assert!(verdict.sources.is_empty());
}

#[tokio::test]
async fn unusable_model_output_falls_back_to_insufficient() {
    let model = ScriptedModel::new(vec![Reply::Json("I think it's true!".to_string())]);
    let v = verifier(FixedSearch::returning(vec![Evidence::new("a", "x")]), model, 0, 1);

    let verdict = v.verify(Claim::new("c")).await.unwrap();

    assert!(verdict.is_insufficient());
    assert_eq!(verdict.reasoning, EVALUATION_FAILED_REASONING);
    assert!(verdict.sources.is_empty());
}

#[tokio::test]
async fn unknown_verdict_tag_defaults_to_insufficient() {
    let model = ScriptedModel::new(vec![evaluation("Mostly True", &[1])]);
    let v = verifier(FixedSearch::returning(vec![Evidence::new("a", "x")]), model, 0, 1);

    let verdict = v.verify(Claim::new("c")).await.unwrap();
    assert!(verdict.is_insufficient());
}

#[tokio::test(start_paused = true)]
async fn cancellation_yields_no_verdict() {
    let model = ScriptedModel::new(vec![Reply::Hang]);
    let v = verifier(FixedSearch::returning(vec![Evidence::new("a", "x")]), model, 3, 1);

    let result = v.verify_with_deadline(Claim::new("c"), Duration::from_secs(1)).await;
    assert!(matches!(result, Err(RuntimeError::Cancelled)));

    let result = v.verify_until(Claim::new("c"), std::future::ready(())).await;
    assert!(matches!(result, Err(RuntimeError::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn timed_out_consensus_sample_is_excluded() {
    let model = ScriptedModel::new(vec![
        evaluation("Supported", &[1]),
        Reply::Hang,
        evaluation("Supported", &[1]),
        evaluation("Refuted", &[1]),
    ]);
    let evidence = vec![Evidence::new("a", "x")];
    let v = verifier(FixedSearch::returning(evidence.clone()), model, 0, 3);

    let verdict = v.verify(Claim::new("c")).await.unwrap();

    assert_eq!(verdict.result, VerificationResult::Supported);
    assert_eq!(verdict.sources, evidence);
}

#[tokio::test]
async fn consensus_plurality_decides_the_verdict() {
    let model = ScriptedModel::new(vec![
        evaluation("Supported", &[1]),
        evaluation("Supported", &[2]),
        evaluation("Refuted", &[1]),
        evaluation("Supported", &[1]),
        evaluation("Insufficient Information", &[]),
    ]);
    let evidence = vec![Evidence::new("a", "x"), Evidence::new("b", "y")];
    let v = verifier(FixedSearch::returning(evidence.clone()), model, 0, 5);

    let verdict = v.verify(Claim::new("c")).await.unwrap();

    assert_eq!(verdict.result, VerificationResult::Supported);
    assert_eq!(verdict.sources, evidence);
}

#[tokio::test]
async fn batch_collects_every_claim() {
    let model = ScriptedModel::new(vec![evaluation("Refuted", &[1])]);
    let v = verifier(FixedSearch::returning(vec![Evidence::new("a", "x")]), model, 0, 1);
    let claims: Vec<Claim> = (0..6).map(|i| Claim::new(format!("claim {}", i))).collect();

    let outcome = v.verify_all(claims, 3, Some(Duration::from_secs(60))).await;

    assert!(outcome.errors.is_empty());
    let verdicts = outcome.verdicts.snapshot();
    assert_eq!(verdicts.len(), 6);
    assert_eq!(verdicts[&5].claim_text, "claim 5");
    assert!(verdicts.values().all(|v| v.result == VerificationResult::Refuted));
}
