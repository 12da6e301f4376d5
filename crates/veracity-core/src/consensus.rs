//! Consensus voting over independent evaluation samples.
//!
//! Aggregation rules (not configurable):
//! 1. Samples are grouped by verdict tag
//! 2. The tag with a strict plurality wins
//! 3. A tie for first place resolves to Insufficient Information
//!
//! The winning reasoning comes from the first sample carrying the winning
//! tag. Cited sources are the union of the winning samples' citations,
//! in first-seen order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::output::EvaluationOutput;
use crate::types::VerificationResult;

/// Reasoning used when a tie resolves to a tag no sample carried.
pub const NO_CONSENSUS_REASONING: &str =
    "Independent evaluations disagreed and no verdict reached a plurality.";

/// The result of a consensus vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    /// The aggregated evaluation
    pub output: EvaluationOutput,

    /// Votes per tag
    pub tally: BTreeMap<VerificationResult, usize>,

    /// Number of samples that took part in the vote
    pub samples: usize,

    /// Whether the vote was decided by the tie-break
    pub tie_break: bool,
}

/// Map a sample's tag to a result, treating unknown tags as insufficient.
fn tag_of(sample: &EvaluationOutput) -> VerificationResult {
    sample.verdict.parse().unwrap_or_else(|_| {
        tracing::warn!(
            verdict = %sample.verdict,
            "Unknown verdict in consensus sample, counting as Insufficient Information"
        );
        VerificationResult::InsufficientInformation
    })
}

/// Aggregate completed samples by plurality vote.
///
/// Returns `None` when there are no samples.
pub fn aggregate(samples: &[EvaluationOutput]) -> Option<ConsensusOutcome> {
    if samples.is_empty() {
        return None;
    }

    let tags: Vec<VerificationResult> = samples.iter().map(tag_of).collect();

    let mut tally: BTreeMap<VerificationResult, usize> = BTreeMap::new();
    for tag in &tags {
        *tally.entry(*tag).or_insert(0) += 1;
    }

    let top = tally.values().copied().max().unwrap_or(0);
    let leaders: Vec<VerificationResult> = tally
        .iter()
        .filter(|(_, count)| **count == top)
        .map(|(tag, _)| *tag)
        .collect();

    let (winner, tie_break) = match leaders.as_slice() {
        [only] => (*only, false),
        _ => (VerificationResult::InsufficientInformation, true),
    };

    let mut representative: Option<&EvaluationOutput> = None;
    let mut indices: Vec<i64> = Vec::new();
    for (sample, tag) in samples.iter().zip(&tags) {
        if *tag != winner {
            continue;
        }
        representative.get_or_insert(sample);
        for idx in &sample.influential_source_indices {
            if !indices.contains(idx) {
                indices.push(*idx);
            }
        }
    }

    let reasoning = representative
        .map(|s| s.reasoning.clone())
        .unwrap_or_else(|| NO_CONSENSUS_REASONING.to_string());

    tracing::debug!(
        samples = samples.len(),
        winner = %winner,
        tie_break,
        tally = ?tally,
        "Consensus vote aggregated"
    );

    Some(ConsensusOutcome {
        output: EvaluationOutput {
            verdict: winner.as_str().to_string(),
            reasoning,
            influential_source_indices: indices,
        },
        tally,
        samples: samples.len(),
        tie_break,
    })
}
