//! Evidence snippets retrieved for a claim.
//!
//! Order is significant: earlier snippets are more relevant, and the
//! budgeter drops from the tail.

use serde::{Deserialize, Serialize};

/// Text used in place of the evidence block when nothing was retrieved.
pub const NO_EVIDENCE_TEXT: &str = "No relevant evidence snippets were found.";

/// A retrieved text snippet with its source URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Evidence {
    /// Where the snippet came from
    pub url: String,

    /// Page title, when the provider reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// The snippet text
    pub text: String,
}

impl Evidence {
    /// Create evidence without a title.
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            text: text.into(),
        }
    }

    /// Set the title. Blank titles are treated as absent.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.title = if title.trim().is_empty() { None } else { Some(title) };
        self
    }

    /// Cap the snippet text to `max_chars` characters.
    pub fn capped(mut self, max_chars: usize) -> Self {
        self.text = truncate_chars(&self.text, max_chars).to_string();
        self
    }

    /// Number of characters in the snippet text.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Render this snippet as it appears in an evaluation prompt.
    ///
    /// `position` is the 1-based source number the model cites.
    pub fn format_as_source(&self, position: usize) -> String {
        let mut out = format!("Source {}: {}\n", position, self.url);
        if let Some(title) = &self.title {
            out.push_str(&format!("Title: {}\n", title));
        }
        out.push_str(&format!("Snippet: {}\n---", self.text.trim()));
        out
    }
}

/// Render an evidence list for an evaluation prompt.
pub fn format_evidence(evidence: &[Evidence]) -> String {
    if evidence.is_empty() {
        return NO_EVIDENCE_TEXT.to_string();
    }

    evidence
        .iter()
        .enumerate()
        .map(|(i, e)| e.format_as_source(i + 1))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Longest prefix of `text` with at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
