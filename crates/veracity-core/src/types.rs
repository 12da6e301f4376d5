//! Shared data model: claims, verification results and verdicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::evidence::Evidence;

/// An atomic factual statement produced by an upstream extraction stage.
///
/// Claims are read-only to the verification workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claim {
    /// The claim as a standalone statement
    pub claim_text: String,

    /// The source sentence with pronouns and references resolved
    pub disambiguated_sentence: String,

    /// The sentence exactly as it appeared in the source text
    pub original_sentence: String,

    /// Position of the original sentence in the source text
    pub original_index: usize,
}

impl Claim {
    /// Create a claim that stands on its own (no surrounding source text).
    pub fn new(claim_text: impl Into<String>) -> Self {
        let claim_text = claim_text.into();
        Self {
            disambiguated_sentence: claim_text.clone(),
            original_sentence: claim_text.clone(),
            claim_text,
            original_index: 0,
        }
    }

    /// Set the sentence context of the claim.
    pub fn with_source(
        mut self,
        original_sentence: impl Into<String>,
        disambiguated_sentence: impl Into<String>,
        original_index: usize,
    ) -> Self {
        self.original_sentence = original_sentence.into();
        self.disambiguated_sentence = disambiguated_sentence.into();
        self.original_index = original_index;
        self
    }
}

/// Classification of a claim against its evidence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VerificationResult {
    #[serde(rename = "Supported")]
    Supported,

    #[serde(rename = "Refuted")]
    Refuted,

    #[serde(rename = "Insufficient Information")]
    InsufficientInformation,

    #[serde(rename = "Conflicting Evidence")]
    ConflictingEvidence,
}

/// A verdict string the model produced that matches no known result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown verification result: '{0}'")]
pub struct UnknownResult(pub String);

impl VerificationResult {
    /// All results, in wire order.
    pub const ALL: [VerificationResult; 4] = [
        VerificationResult::Supported,
        VerificationResult::Refuted,
        VerificationResult::InsufficientInformation,
        VerificationResult::ConflictingEvidence,
    ];

    /// The canonical wire string for this result.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationResult::Supported => "Supported",
            VerificationResult::Refuted => "Refuted",
            VerificationResult::InsufficientInformation => "Insufficient Information",
            VerificationResult::ConflictingEvidence => "Conflicting Evidence",
        }
    }

    /// Whether the evidence settled the claim one way or the other.
    pub fn is_conclusive(&self) -> bool {
        matches!(self, VerificationResult::Supported | VerificationResult::Refuted)
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationResult {
    type Err = UnknownResult;

    /// Lenient parse: case-insensitive, `_`, `-` and spaces are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == '_' || c == '-' { ' ' } else { c.to_ascii_lowercase() })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        match normalized.as_str() {
            "supported" => Ok(VerificationResult::Supported),
            "refuted" => Ok(VerificationResult::Refuted),
            "insufficient information" => Ok(VerificationResult::InsufficientInformation),
            "conflicting evidence" => Ok(VerificationResult::ConflictingEvidence),
            _ => Err(UnknownResult(s.to_string())),
        }
    }
}

/// The final classification of a claim, with reasoning and cited sources.
///
/// Claim fields are copied, not referenced. Every element of `sources`
/// is an element of the evidence list the verdict was built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub claim_text: String,
    pub disambiguated_sentence: String,
    pub original_sentence: String,
    pub original_index: usize,

    /// The classification
    pub result: VerificationResult,

    /// Short explanation of the classification
    pub reasoning: String,

    /// Evidence that influenced the result, in citation order
    pub sources: Vec<Evidence>,

    /// When the verdict was produced
    pub evaluated_at: DateTime<Utc>,
}

impl Verdict {
    /// Create a verdict for a claim.
    pub fn new(
        claim: &Claim,
        result: VerificationResult,
        reasoning: impl Into<String>,
        sources: Vec<Evidence>,
    ) -> Self {
        Self {
            claim_text: claim.claim_text.clone(),
            disambiguated_sentence: claim.disambiguated_sentence.clone(),
            original_sentence: claim.original_sentence.clone(),
            original_index: claim.original_index,
            result,
            reasoning: reasoning.into(),
            sources,
            evaluated_at: Utc::now(),
        }
    }

    /// Whether more evidence could change this verdict.
    pub fn is_insufficient(&self) -> bool {
        self.result == VerificationResult::InsufficientInformation
    }
}
