//! Verdict building: turn model output into a validated, attributed verdict.
//!
//! The builder never fails. Missing output, unknown verdict tags and
//! out-of-range source indices all degrade to a well-formed verdict.

use crate::evidence::Evidence;
use crate::output::EvaluationOutput;
use crate::types::{Claim, Verdict, VerificationResult};

/// Reasoning used when the model produced no usable output.
pub const EVALUATION_FAILED_REASONING: &str =
    "Failed to evaluate the evidence due to technical issues.";

/// Builds verdicts from evaluation output.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerdictBuilder;

impl VerdictBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a verdict for `claim` from the evidence shown to the model and
    /// the model's output, if any.
    ///
    /// Sources are resolved from 1-based indices into `evidence`. Indices
    /// outside `1..=evidence.len()` are dropped and duplicates are cited once,
    /// so every source is an element of `evidence`.
    pub fn build(
        &self,
        claim: &Claim,
        evidence: &[Evidence],
        output: Option<&EvaluationOutput>,
    ) -> Verdict {
        let Some(output) = output else {
            tracing::warn!(
                claim = %claim.claim_text,
                "No usable evaluation output, falling back to Insufficient Information"
            );
            return Verdict::new(
                claim,
                VerificationResult::InsufficientInformation,
                EVALUATION_FAILED_REASONING,
                Vec::new(),
            );
        };

        let result = output.verdict.parse().unwrap_or_else(|e| {
            tracing::warn!(
                error = %e,
                claim = %claim.claim_text,
                "Invalid verdict from model, defaulting to Insufficient Information"
            );
            VerificationResult::InsufficientInformation
        });

        let sources = resolve_sources(evidence, &output.influential_source_indices);

        let verdict = Verdict::new(claim, result, output.reasoning.clone(), sources);
        tracing::info!(
            claim = %claim.claim_text,
            result = %verdict.result,
            sources = verdict.sources.len(),
            "Verdict built"
        );
        verdict
    }
}

/// Resolve 1-based citations against `evidence`.
pub fn resolve_sources(evidence: &[Evidence], indices: &[i64]) -> Vec<Evidence> {
    let mut seen: Vec<usize> = Vec::with_capacity(indices.len());
    for &idx in indices {
        let position = usize::try_from(idx)
            .ok()
            .filter(|i| (1..=evidence.len()).contains(i));

        match position {
            Some(i) if !seen.contains(&i) => seen.push(i),
            Some(_) => {}
            None => {
                tracing::warn!(
                    index = idx,
                    available = evidence.len(),
                    "Invalid source index referenced in verdict"
                );
            }
        }
    }

    seen.into_iter().map(|i| evidence[i - 1].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(verdict: &str, indices: &[i64]) -> EvaluationOutput {
        EvaluationOutput {
            verdict: verdict.to_string(),
            reasoning: "because".to_string(),
            influential_source_indices: indices.to_vec(),
        }
    }

    fn evidence() -> Vec<Evidence> {
        vec![
            Evidence::new("a", "first"),
            Evidence::new("b", "second"),
            Evidence::new("c", "third"),
        ]
    }

    #[test]
    fn test_missing_output_falls_back() {
        let claim = Claim::new("The sky is green.");
        let verdict = VerdictBuilder::new().build(&claim, &evidence(), None);

        assert_eq!(verdict.result, VerificationResult::InsufficientInformation);
        assert_eq!(verdict.reasoning, EVALUATION_FAILED_REASONING);
        assert!(verdict.sources.is_empty());
        assert_eq!(verdict.claim_text, "The sky is green.");
    }

    #[test]
    fn test_sources_resolved_in_citation_order() {
        let claim = Claim::new("c");
        let ev = evidence();
        let verdict = VerdictBuilder::new().build(&claim, &ev, Some(&output("Refuted", &[3, 1])));

        assert_eq!(verdict.result, VerificationResult::Refuted);
        assert_eq!(verdict.sources, vec![ev[2].clone(), ev[0].clone()]);
        assert_eq!(verdict.reasoning, "because");
    }

    #[test]
    fn test_out_of_range_indices_dropped() {
        let claim = Claim::new("c");
        let ev = evidence();
        let verdict = VerdictBuilder::new().build(
            &claim,
            &ev,
            Some(&output("Supported", &[0, -1, 2, 4, 99, 2])),
        );

        assert_eq!(verdict.sources, vec![ev[1].clone()]);
    }

    #[test]
    fn test_unknown_verdict_defaults_to_insufficient() {
        let claim = Claim::new("c");
        let verdict =
            VerdictBuilder::new().build(&claim, &evidence(), Some(&output("Probably", &[1])));

        assert_eq!(verdict.result, VerificationResult::InsufficientInformation);
        assert_eq!(verdict.reasoning, "because");
        assert_eq!(verdict.sources.len(), 1);
    }

    #[test]
    fn test_indices_against_empty_evidence() {
        let claim = Claim::new("c");
        let verdict = VerdictBuilder::new().build(&claim, &[], Some(&output("Supported", &[1])));

        assert!(verdict.sources.is_empty());
        assert_eq!(verdict.result, VerificationResult::Supported);
    }
}
