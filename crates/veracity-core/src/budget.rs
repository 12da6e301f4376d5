//! Evidence budgeting: keep the evaluation prompt within a token budget.
//!
//! Evidence is taken greedily in relevance order. Items are never
//! reordered and never partially cut, with one exception: when not even
//! the first item fits whole, a truncated copy of it is tried so the model
//! still sees the best-ranked source.

use serde::{Deserialize, Serialize};

use crate::evidence::{format_evidence, Evidence};

/// Approximate characters per token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of `text`.
///
/// Character based and monotonic in input length, so the same input
/// always produces the same estimate.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// What the budgeter did to an evidence list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationReport {
    /// Items passed in
    pub input_items: usize,

    /// Items kept (including a truncated first item)
    pub kept_items: usize,

    /// Whether the single kept item was cut to fit
    pub truncated_first: bool,

    /// Estimated tokens of fixed text plus formatted evidence
    pub estimated_tokens: usize,

    /// The budget that was applied
    pub budget: usize,
}

impl TruncationReport {
    /// Number of items dropped from the tail.
    pub fn dropped_items(&self) -> usize {
        self.input_items.saturating_sub(self.kept_items)
    }
}

/// Evidence that fits the budget, with a report of what was dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetedEvidence {
    pub evidence: Vec<Evidence>,
    pub report: TruncationReport,
}

/// Trims evidence lists to a fixed token budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidenceBudgeter {
    budget: usize,
}

impl EvidenceBudgeter {
    /// Create a budgeter for the given token budget.
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    /// The configured token budget.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Trim `evidence` so that the prompt fits the budget.
    ///
    /// The fixed cost is `fixed_prompt_text` plus `claim_text`, each
    /// estimated separately. Because the estimate rounds up, the sum is
    /// never below the estimate of the concatenated prompt.
    pub fn truncate(
        &self,
        evidence: &[Evidence],
        claim_text: &str,
        fixed_prompt_text: &str,
    ) -> BudgetedEvidence {
        let fixed = estimate_tokens(fixed_prompt_text) + estimate_tokens(claim_text);
        let fits =
            |items: &[Evidence]| fixed + estimate_tokens(&format_evidence(items)) <= self.budget;

        let mut kept: Vec<Evidence> = Vec::with_capacity(evidence.len());
        for item in evidence {
            kept.push(item.clone());
            if !fits(&kept) {
                kept.pop();
                break;
            }
        }

        let mut truncated_first = false;
        if kept.is_empty() {
            if let Some(first) = evidence.first() {
                if let Some(cut) = self.fit_truncated(first, &fits) {
                    kept.push(cut);
                    truncated_first = true;
                }
            }
        }

        let report = TruncationReport {
            input_items: evidence.len(),
            kept_items: kept.len(),
            truncated_first,
            estimated_tokens: fixed + estimate_tokens(&format_evidence(&kept)),
            budget: self.budget,
        };

        if report.dropped_items() > 0 || truncated_first {
            tracing::debug!(
                input = report.input_items,
                kept = report.kept_items,
                truncated_first,
                estimated_tokens = report.estimated_tokens,
                budget = self.budget,
                "Evidence truncated to fit token budget"
            );
        }

        BudgetedEvidence { evidence: kept, report }
    }

    /// Longest prefix of `item` that fits, if any non-blank prefix does.
    ///
    /// The formatted length is non-decreasing in the prefix length, so a
    /// binary search finds the largest fitting prefix.
    fn fit_truncated(
        &self,
        item: &Evidence,
        fits: &impl Fn(&[Evidence]) -> bool,
    ) -> Option<Evidence> {
        let with_chars = |n: usize| item.clone().capped(n);

        let (mut lo, mut hi) = (0usize, item.char_len());
        if !fits(&[with_chars(0)]) {
            return None;
        }
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if fits(&[with_chars(mid)]) {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        let cut = with_chars(lo);
        if cut.text.trim().is_empty() {
            None
        } else {
            Some(cut)
        }
    }
}

/// Trim `evidence` to `budget` tokens. See [`EvidenceBudgeter::truncate`].
pub fn truncate_evidence(
    evidence: &[Evidence],
    claim_text: &str,
    fixed_prompt_text: &str,
    budget: usize,
) -> Vec<Evidence> {
    EvidenceBudgeter::new(budget)
        .truncate(evidence, claim_text, fixed_prompt_text)
        .evidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snippet(i: usize, len: usize) -> Evidence {
        Evidence::new(format!("https://example.com/{}", i), "x".repeat(len))
    }

    fn prompt_tokens(fixed: &str, claim: &str, evidence: &[Evidence]) -> usize {
        estimate_tokens(fixed)
            + estimate_tokens(claim)
            + estimate_tokens(&format_evidence(evidence))
    }

    #[test]
    fn test_estimate_is_ceiling_of_quarter() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_everything_fits() {
        let evidence = vec![snippet(1, 40), snippet(2, 40)];
        let out = EvidenceBudgeter::new(10_000).truncate(&evidence, "claim", "system");

        assert_eq!(out.evidence, evidence);
        assert_eq!(out.report.dropped_items(), 0);
        assert!(!out.report.truncated_first);
    }

    #[test]
    fn test_drops_tail_in_order() {
        let evidence: Vec<_> = (0..10).map(|i| snippet(i, 400)).collect();
        let budget = 350;
        let out = EvidenceBudgeter::new(budget).truncate(&evidence, "claim", "system prompt");

        assert!(!out.evidence.is_empty());
        assert!(out.evidence.len() < evidence.len());
        assert_eq!(out.evidence[..], evidence[..out.evidence.len()]);
        assert!(prompt_tokens("system prompt", "claim", &out.evidence) <= budget);
        assert_eq!(out.report.kept_items, out.evidence.len());
    }

    #[test]
    fn test_stops_at_first_item_that_does_not_fit() {
        // A small item after a large one is not pulled forward.
        let evidence = vec![snippet(0, 100), snippet(1, 4000), snippet(2, 10)];
        let out = EvidenceBudgeter::new(200).truncate(&evidence, "c", "s");

        assert_eq!(out.evidence, vec![evidence[0].clone()]);
    }

    #[test]
    fn test_truncates_first_item_when_nothing_fits() {
        let evidence = vec![snippet(0, 4000), snippet(1, 10)];
        let out = EvidenceBudgeter::new(100).truncate(&evidence, "claim", "system");

        assert_eq!(out.evidence.len(), 1);
        assert!(out.report.truncated_first);
        assert_eq!(out.evidence[0].url, evidence[0].url);
        assert!(out.evidence[0].char_len() < 4000);
        assert!(evidence[0].text.starts_with(&out.evidence[0].text));
        assert!(prompt_tokens("system", "claim", &out.evidence) <= 100);
    }

    #[test]
    fn test_empty_when_fixed_text_exceeds_budget() {
        let evidence = vec![snippet(0, 50)];
        let fixed = "y".repeat(1000);
        let out = EvidenceBudgeter::new(10).truncate(&evidence, "claim", &fixed);

        assert!(out.evidence.is_empty());
        assert_eq!(out.report.dropped_items(), 1);
    }

    #[test]
    fn test_empty_input() {
        let out = EvidenceBudgeter::new(10).truncate(&[], "claim", "system");
        assert!(out.evidence.is_empty());
        assert_eq!(out.report.input_items, 0);
    }

    proptest! {
        #[test]
        fn prop_output_fits_budget_and_is_prefix(
            lens in proptest::collection::vec(0usize..600, 0..12),
            budget in 0usize..1500,
            fixed_len in 0usize..800,
        ) {
            let evidence: Vec<_> = lens.iter().enumerate().map(|(i, l)| snippet(i, *l)).collect();
            let fixed = "s".repeat(fixed_len);
            let budgeter = EvidenceBudgeter::new(budget);

            let out = budgeter.truncate(&evidence, "The claim", &fixed);

            if !out.evidence.is_empty() {
                prop_assert!(prompt_tokens(&fixed, "The claim", &out.evidence) <= budget);
            }

            if out.report.truncated_first {
                prop_assert_eq!(out.evidence.len(), 1);
                prop_assert!(evidence[0].text.starts_with(&out.evidence[0].text));
            } else {
                prop_assert_eq!(&out.evidence[..], &evidence[..out.evidence.len()]);
            }

            // Deterministic for identical inputs.
            let again = budgeter.truncate(&evidence, "The claim", &fixed);
            prop_assert_eq!(out, again);
        }
    }
}
