//! # veracity-core
//!
//! Deterministic building blocks of the claim verification workflow.
//!
//! This crate answers, for a single claim and a set of evidence:
//! - Which evidence fits the model's context budget?
//! - What did the model decide, and is that output well-formed?
//! - Which sources may the verdict cite?
//! - Should the workflow retry or stop?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input always produces same output
//! 2. **No I/O**: Search and model calls live in `veracity-runtime`
//! 3. **No fabricated sources**: Every cited source is an element of the
//!    evidence that was evaluated
//! 4. **Bounded**: A workflow evaluates at most `max_retries + 1` times
//!
//! ## Example
//!
//! ```rust,ignore
//! use veracity_core::{Claim, Evidence, EvidenceBudgeter, VerdictBuilder};
//!
//! let claim = Claim::new("The Eiffel Tower is 330 meters tall.");
//! let evidence = vec![Evidence::new("a", "The Eiffel Tower stands 330m with antennas.")];
//!
//! let budgeted =
//!     EvidenceBudgeter::new(8000).truncate(&evidence, &claim.claim_text, SYSTEM_PROMPT);
//! let output = EvaluationOutput::schema()?.parse(&raw_model_response)?;
//! let verdict = VerdictBuilder::new().build(&claim, &budgeted.evidence, Some(&output));
//! ```

pub mod budget;
pub mod consensus;
pub mod evidence;
pub mod output;
pub mod types;
pub mod verdict;
pub mod workflow;

// Re-export main types at crate root
pub use budget::{
    estimate_tokens, truncate_evidence, BudgetedEvidence, EvidenceBudgeter, TruncationReport,
};
pub use consensus::{aggregate, ConsensusOutcome, NO_CONSENSUS_REASONING};
pub use evidence::{format_evidence, Evidence, NO_EVIDENCE_TEXT};
pub use output::{extract_json, EvaluationOutput, OutputError, OutputSchema, QueryOutput};
pub use types::{Claim, UnknownResult, Verdict, VerificationResult};
pub use verdict::{resolve_sources, VerdictBuilder, EVALUATION_FAILED_REASONING};
pub use workflow::{
    transition, Event, StateUpdate, Step, Transition, TransitionError, WorkflowPolicy,
    WorkflowState,
};
