//! Rewrites handler output into a short, speech-friendly reply.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::llm::{LlmProvider, complete_text};

const NORMALIZER_SYSTEM_PROMPT: &str = "You rewrite assistant replies so they sound natural when spoken aloud.";

/// Used when there is nothing to normalize.
pub const EMPTY_RESPONSE_MESSAGE: &str =
    "Sorry, I don't have an answer for that right now. Could you try asking another way?";

static LIST_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+").expect("valid list marker regex")
});
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*#+\s*").expect("valid heading regex"));
static EMPHASIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*|__|`+|\*").expect("valid emphasis regex"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Whether the text must reach the user untouched.
///
/// Anything mentioning "form" (case-insensitive substring) keeps its exact
/// structure.
pub fn preserves_structure(text: &str) -> bool {
    text.to_lowercase().contains("form")
}

/// Strip markdown structure and collapse whitespace.
pub fn strip_formatting(text: &str) -> String {
    let text = LIST_MARKER_RE.replace_all(text, "");
    let text = HEADING_RE.replace_all(&text, "");
    let text = EMPHASIS_RE.replace_all(&text, "");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

pub struct ResponseNormalizer {
    llm: Arc<dyn LlmProvider>,
}

impl ResponseNormalizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn normalize(&self, raw: &str) -> String {
        if raw.trim().is_empty() {
            return EMPTY_RESPONSE_MESSAGE.to_string();
        }
        if preserves_structure(raw) {
            debug!("Passing response through unchanged");
            return raw.to_string();
        }

        let prompt = format!(
            "\
Make this response sound natural and conversational, as if speaking to someone.
Remove all emojis, bullet points and formatting.
Keep it under 150 words.

{raw}"
        );

        match complete_text(self.llm.as_ref(), NORMALIZER_SYSTEM_PROMPT, &prompt, 0.3, 400).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => strip_formatting(raw),
            Err(e) => {
                warn!("Response normalization failed, using raw text: {}", e);
                strip_formatting(raw)
            }
        }
    }
}
