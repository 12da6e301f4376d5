//! Claim verification state machine.
//!
//! ```text
//! GENERATE_QUERY --query--> RETRIEVE --evidence--> EVALUATE --+--> DONE
//!       ^                                                     |
//!       +------ insufficient && retry_count < max_retries ----+
//! ```
//!
//! The transition function is pure: it reads the current state and an
//! event and returns the next step plus the fields to update. Only
//! [`WorkflowState::apply`] moves the workflow; the driver may additionally
//! fix the prompt time of an attempt with [`WorkflowState::prompt_time_or`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::evidence::Evidence;
use crate::types::{Claim, Verdict};

/// Where a workflow is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    GenerateQuery,
    Retrieve,
    Evaluate,
    Done,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::GenerateQuery => "GENERATE_QUERY",
            Step::Retrieve => "RETRIEVE",
            Step::Evaluate => "EVALUATE",
            Step::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Errors from feeding the state machine an event it cannot accept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Event '{event}' is not valid in step {step}")]
    UnexpectedEvent { step: Step, event: &'static str },

    #[error("Workflow is already done")]
    AlreadyDone,
}

/// Fixed bounds of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    /// Retries allowed after an insufficient verdict. 0 disables retry.
    pub max_retries: u32,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Something that happened while working on a claim.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A search query was produced (`None` when the generator had nothing).
    QueryGenerated(Option<String>),

    /// Evidence was retrieved and budgeted.
    EvidenceRetrieved(Vec<Evidence>),

    /// The evidence was evaluated into a verdict.
    Evaluated(Verdict),
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::QueryGenerated(_) => "query_generated",
            Event::EvidenceRetrieved(_) => "evidence_retrieved",
            Event::Evaluated(_) => "evaluated",
        }
    }
}

/// Field updates produced by a transition. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub query: Option<Option<String>>,
    pub evidence: Option<Vec<Evidence>>,
    pub retry_count: Option<u32>,
    pub verdict: Option<Option<Verdict>>,
    pub attempts: Option<u32>,
    pub prompt_time: Option<Option<DateTime<Utc>>>,
}

/// The next step and the updates that lead to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: Step,
    pub update: StateUpdate,
}

/// Per-claim workflow state. One instance per claim, never shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// The claim under verification
    pub claim: Claim,

    /// The current search query
    #[serde(default)]
    pub query: Option<String>,

    /// The current (budgeted) evidence set; cleared on retry
    #[serde(default)]
    pub evidence: Vec<Evidence>,

    /// Retries taken so far; reset to 0 when the workflow finishes
    #[serde(default)]
    pub retry_count: u32,

    /// Set only on the terminating transition
    #[serde(default)]
    pub verdict: Option<Verdict>,

    /// The step the workflow is in
    pub step: Step,

    /// Evaluations performed so far
    #[serde(default)]
    pub attempts: u32,

    /// Time stated in the prompts of the current attempt; cleared on retry
    #[serde(default)]
    pub prompt_time: Option<DateTime<Utc>>,
}

impl WorkflowState {
    /// Fresh state for a claim entering the workflow.
    pub fn new(claim: Claim) -> Self {
        Self {
            claim,
            query: None,
            evidence: Vec::new(),
            retry_count: 0,
            verdict: None,
            step: Step::GenerateQuery,
            attempts: 0,
            prompt_time: None,
        }
    }

    /// The prompt time of the current attempt, fixing it to `now` on
    /// first use. Budgeting and evaluation then see the same prompt text.
    pub fn prompt_time_or(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        *self.prompt_time.get_or_insert(now)
    }

    /// Whether the workflow reached its terminal step.
    pub fn is_done(&self) -> bool {
        self.step == Step::Done
    }

    /// The final verdict, once the workflow is done.
    pub fn final_verdict(&self) -> Option<&Verdict> {
        if self.is_done() {
            self.verdict.as_ref()
        } else {
            None
        }
    }

    /// Apply a transition computed by [`transition`].
    pub fn apply(&mut self, transition: Transition) {
        let Transition { next, update } = transition;
        if let Some(query) = update.query {
            self.query = query;
        }
        if let Some(evidence) = update.evidence {
            self.evidence = evidence;
        }
        if let Some(retry_count) = update.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(verdict) = update.verdict {
            self.verdict = verdict;
        }
        if let Some(attempts) = update.attempts {
            self.attempts = attempts;
        }
        if let Some(prompt_time) = update.prompt_time {
            self.prompt_time = prompt_time;
        }
        self.step = next;
    }

    /// Compute and apply the transition for `event`.
    pub fn advance(
        &mut self,
        event: Event,
        policy: &WorkflowPolicy,
    ) -> Result<Step, TransitionError> {
        let t = transition(self, event, policy)?;
        self.apply(t);
        Ok(self.step)
    }
}

/// The transition function.
pub fn transition(
    state: &WorkflowState,
    event: Event,
    policy: &WorkflowPolicy,
) -> Result<Transition, TransitionError> {
    match (state.step, event) {
        (Step::Done, _) => Err(TransitionError::AlreadyDone),

        (Step::GenerateQuery, Event::QueryGenerated(query)) => Ok(Transition {
            next: Step::Retrieve,
            update: StateUpdate {
                query: Some(query),
                ..Default::default()
            },
        }),

        (Step::Retrieve, Event::EvidenceRetrieved(evidence)) => Ok(Transition {
            next: Step::Evaluate,
            update: StateUpdate {
                evidence: Some(evidence),
                ..Default::default()
            },
        }),

        (Step::Evaluate, Event::Evaluated(verdict)) => {
            let attempts = state.attempts + 1;
            let should_retry = verdict.is_insufficient() && state.retry_count < policy.max_retries;

            if should_retry {
                Ok(Transition {
                    next: Step::GenerateQuery,
                    update: StateUpdate {
                        evidence: Some(Vec::new()),
                        retry_count: Some(state.retry_count + 1),
                        verdict: Some(None),
                        attempts: Some(attempts),
                        prompt_time: Some(None),
                        ..Default::default()
                    },
                })
            } else {
                Ok(Transition {
                    next: Step::Done,
                    update: StateUpdate {
                        retry_count: Some(0),
                        verdict: Some(Some(verdict)),
                        attempts: Some(attempts),
                        ..Default::default()
                    },
                })
            }
        }

        (step, event) => Err(TransitionError::UnexpectedEvent {
            step,
            event: event.name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VerificationResult;

    fn verdict(claim: &Claim, result: VerificationResult, sources: Vec<Evidence>) -> Verdict {
        Verdict::new(claim, result, "r", sources)
    }

    fn run_attempt(
        state: &mut WorkflowState,
        policy: &WorkflowPolicy,
        result: VerificationResult,
    ) -> Step {
        let evidence = vec![Evidence::new("u", "t")];
        state.advance(Event::QueryGenerated(Some("q".into())), policy).unwrap();
        state.advance(Event::EvidenceRetrieved(evidence.clone()), policy).unwrap();
        let v = verdict(&state.claim, result, evidence);
        state.advance(Event::Evaluated(v), policy).unwrap()
    }

    #[test]
    fn test_happy_path() {
        let policy = WorkflowPolicy { max_retries: 3 };
        let mut state = WorkflowState::new(Claim::new("c"));
        assert_eq!(state.step, Step::GenerateQuery);

        let step = run_attempt(&mut state, &policy, VerificationResult::Supported);

        assert_eq!(step, Step::Done);
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.attempts, 1);
        assert_eq!(state.evidence.len(), 1);
        assert_eq!(state.final_verdict().unwrap().result, VerificationResult::Supported);
    }

    #[test]
    fn test_retry_clears_evidence_and_discards_verdict() {
        let policy = WorkflowPolicy { max_retries: 2 };
        let mut state = WorkflowState::new(Claim::new("c"));

        let step = run_attempt(&mut state, &policy, VerificationResult::InsufficientInformation);

        assert_eq!(step, Step::GenerateQuery);
        assert_eq!(state.retry_count, 1);
        assert!(state.evidence.is_empty());
        assert!(state.verdict.is_none());
        assert_eq!(state.query.as_deref(), Some("q"));
    }

    #[test]
    fn test_prompt_time_is_fixed_per_attempt() {
        let policy = WorkflowPolicy { max_retries: 1 };
        let mut state = WorkflowState::new(Claim::new("c"));
        let first = Utc::now();
        let later = first + chrono::Duration::seconds(90);

        assert_eq!(state.prompt_time_or(first), first);
        assert_eq!(state.prompt_time_or(later), first);

        run_attempt(&mut state, &policy, VerificationResult::InsufficientInformation);
        assert!(state.prompt_time.is_none());
        assert_eq!(state.prompt_time_or(later), later);
    }

    #[test]
    fn test_insufficient_then_supported() {
        let policy = WorkflowPolicy { max_retries: 3 };
        let mut state = WorkflowState::new(Claim::new("c"));

        let insufficient = VerificationResult::InsufficientInformation;
        assert_eq!(run_attempt(&mut state, &policy, insufficient), Step::GenerateQuery);
        assert_eq!(run_attempt(&mut state, &policy, insufficient), Step::GenerateQuery);
        assert_eq!(state.retry_count, 2);
        let step = run_attempt(&mut state, &policy, VerificationResult::Supported);
        assert_eq!(step, Step::Done);

        assert_eq!(state.retry_count, 0);
        assert_eq!(state.attempts, 3);
        assert_eq!(state.verdict.as_ref().unwrap().result, VerificationResult::Supported);
    }

    #[test]
    fn test_retries_exhausted() {
        let policy = WorkflowPolicy { max_retries: 1 };
        let mut state = WorkflowState::new(Claim::new("c"));

        run_attempt(&mut state, &policy, VerificationResult::InsufficientInformation);
        let step = run_attempt(&mut state, &policy, VerificationResult::InsufficientInformation);

        assert_eq!(step, Step::Done);
        assert_eq!(state.attempts, 2);
        assert_eq!(state.retry_count, 0);
        assert!(state.verdict.as_ref().unwrap().is_insufficient());
    }

    #[test]
    fn test_zero_retries_never_loops() {
        let policy = WorkflowPolicy { max_retries: 0 };
        let mut state = WorkflowState::new(Claim::new("c"));

        let step = run_attempt(&mut state, &policy, VerificationResult::InsufficientInformation);
        assert_eq!(step, Step::Done);
        assert_eq!(state.attempts, 1);
    }

    #[test]
    fn test_conflicting_terminates() {
        let policy = WorkflowPolicy { max_retries: 3 };
        let mut state = WorkflowState::new(Claim::new("c"));

        let step = run_attempt(&mut state, &policy, VerificationResult::ConflictingEvidence);
        assert_eq!(step, Step::Done);
    }

    #[test]
    fn test_unexpected_event_rejected() {
        let policy = WorkflowPolicy::default();
        let state = WorkflowState::new(Claim::new("c"));

        let err = transition(&state, Event::EvidenceRetrieved(vec![]), &policy).unwrap_err();
        assert_eq!(
            err,
            TransitionError::UnexpectedEvent {
                step: Step::GenerateQuery,
                event: "evidence_retrieved"
            }
        );
    }

    #[test]
    fn test_done_is_terminal() {
        let policy = WorkflowPolicy { max_retries: 0 };
        let mut state = WorkflowState::new(Claim::new("c"));
        run_attempt(&mut state, &policy, VerificationResult::Refuted);

        let err = state.advance(Event::QueryGenerated(None), &policy).unwrap_err();
        assert_eq!(err, TransitionError::AlreadyDone);
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let mut state = WorkflowState::new(Claim::new("c"));
        state
            .advance(Event::QueryGenerated(Some("q".into())), &WorkflowPolicy::default())
            .unwrap();
        state.prompt_time_or(Utc::now());

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"RETRIEVE\""));
        let back: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
