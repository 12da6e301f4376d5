//! Default prompts for query generation and evidence evaluation.
//!
//! Prompt wording is not part of the workflow contract; the verifier only
//! relies on the message layout (one system message, one user message)
//! and on the fixed text used for token budgeting.

use chrono::{DateTime, Utc};
use veracity_core::{format_evidence, Claim, Evidence};

use crate::providers::ChatMessage;

/// System prompt for evidence evaluation. `{current_time}` is filled per call.
pub const EVALUATION_SYSTEM_PROMPT: &str = r#"You are a meticulous fact-checker. The current time is {current_time}.

Decide whether the claim is supported by the evidence snippets provided. Use only that evidence, never prior knowledge.

## Verdicts
- "Supported": the evidence clearly and consistently supports the claim from reliable sources
- "Refuted": the evidence clearly contradicts the claim with authoritative sources
- "Insufficient Information": the evidence is limited, unclear or not comprehensive enough for a definitive conclusion
- "Conflicting Evidence": reliable sources contradict each other about the claim

## Output (JSON)
{
  "verdict": "Supported" | "Refuted" | "Insufficient Information" | "Conflicting Evidence",
  "reasoning": "1-2 sentences naming the evidence that decided the verdict and its limitations",
  "influential_source_indices": [1-based source numbers you relied on]
}

Cite only source numbers that appear in the evidence. For insufficient or conflicting verdicts, cite every source you considered."#;

/// User message for evidence evaluation.
pub const EVALUATION_USER_TEMPLATE: &str = r#"Claim: {claim_text}

Evidence:
{evidence}

Evaluate the claim against the evidence and answer with the JSON object only."#;

/// System prompt for search query generation.
pub const QUERY_SYSTEM_PROMPT: &str = r#"You write web search queries for fact-checking. The current time is {current_time}.

Given a claim, write one concise search query that would surface authoritative evidence confirming or refuting it. Prefer specific names, numbers and dates from the claim.

If a previous query or earlier evidence is shown, it was not enough to reach a verdict: write a different query that looks for what is missing.

Answer with JSON only: {"query": "..."}"#;

/// User message for search query generation.
pub const QUERY_USER_TEMPLATE: &str = r#"Claim: {claim_text}

Context: {disambiguated_sentence}

Attempt: {attempt}
Previous query: {previous_query}

Earlier evidence:
{evidence}"#;

fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// The system prompt for an evaluation made at `now`.
pub fn evaluation_system_prompt(now: DateTime<Utc>) -> String {
    EVALUATION_SYSTEM_PROMPT.replace("{current_time}", &timestamp(now))
}

/// Fixed prompt text counted against the token budget.
///
/// Everything the evaluation prompt contains except the claim and the
/// evidence block.
pub fn evaluation_fixed_text(system_prompt: &str) -> String {
    let template = EVALUATION_USER_TEMPLATE
        .replace("{claim_text}", "")
        .replace("{evidence}", "");
    format!("{}{}", system_prompt, template)
}

/// Messages for evaluating `claim` against budgeted `evidence`.
pub fn evaluation_messages(
    system_prompt: &str,
    claim: &Claim,
    evidence: &[Evidence],
) -> Vec<ChatMessage> {
    let user = EVALUATION_USER_TEMPLATE
        .replace("{claim_text}", &claim.claim_text)
        .replace("{evidence}", &format_evidence(evidence));

    vec![ChatMessage::system(system_prompt), ChatMessage::user(user)]
}

/// Messages for generating the next search query.
///
/// `retry_count` is shown as the 1-based attempt number.
pub fn query_messages(
    claim: &Claim,
    prior_evidence: &[Evidence],
    previous_query: Option<&str>,
    retry_count: u32,
    now: DateTime<Utc>,
) -> Vec<ChatMessage> {
    let system = QUERY_SYSTEM_PROMPT.replace("{current_time}", &timestamp(now));
    let evidence = if prior_evidence.is_empty() {
        "None yet.".to_string()
    } else {
        format_evidence(prior_evidence)
    };
    let previous = previous_query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or("None.");
    let user = QUERY_USER_TEMPLATE
        .replace("{claim_text}", &claim.claim_text)
        .replace("{disambiguated_sentence}", &claim.disambiguated_sentence)
        .replace("{attempt}", &(retry_count + 1).to_string())
        .replace("{previous_query}", previous)
        .replace("{evidence}", &evidence);

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}
