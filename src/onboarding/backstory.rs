//! One-time brand backstory synthesis.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::LlmError;
use crate::llm::{LlmProvider, complete_text};
use crate::profile::ProfileFields;

use super::prompts::{BACKSTORY_SYSTEM_PROMPT, backstory_prompt};

static BACKSTORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)Backstory:\s*(.+?)(?:\n\s*Tagline:|$)").expect("valid backstory regex")
});
static TAGLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)Tagline:\s*(.+)$").expect("valid tagline regex"));

pub struct BackstoryGenerator {
    llm: Arc<dyn LlmProvider>,
}

impl BackstoryGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Generate the stored backstory text for a completed profile.
    pub async fn generate(&self, fields: &ProfileFields) -> Result<String, LlmError> {
        let raw = complete_text(
            self.llm.as_ref(),
            BACKSTORY_SYSTEM_PROMPT,
            &backstory_prompt(fields),
            0.7,
            700,
        )
        .await?;

        let text = compose_backstory(&raw);
        if text.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: "empty backstory".to_string(),
            });
        }
        Ok(text)
    }
}

/// Turn the labeled model output into the stored text.
///
/// The narrative comes from the `Backstory:` section (the whole reply when
/// the label is missing); a `Tagline:` section is appended after a blank line.
pub fn compose_backstory(raw: &str) -> String {
    let raw = raw.trim();
    let story = BACKSTORY_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(raw);
    let tagline = TAGLINE_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|t| !t.is_empty());

    match tagline {
        Some(tagline) => format!("{story}\n\nTagline: {tagline}"),
        None => story.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeled_sections_are_combined() {
        let raw = "Backstory: Asha learned pottery from her grandmother.\nShe still uses river clay.\nTagline: Earth, shaped by hand.";
        assert_eq!(
            compose_backstory(raw),
            "Asha learned pottery from her grandmother.\nShe still uses river clay.\n\nTagline: Earth, shaped by hand."
        );
    }

    #[test]
    fn labels_are_case_insensitive() {
        let raw = "BACKSTORY: Woven in Bengal.\n  tagline: Threads of home";
        assert_eq!(compose_backstory(raw), "Woven in Bengal.\n\nTagline: Threads of home");
    }

    #[test]
    fn missing_backstory_label_uses_whole_text() {
        let raw = "A family of weavers from Kutch.";
        assert_eq!(compose_backstory(raw), raw);
    }

    #[test]
    fn backstory_without_tagline() {
        assert_eq!(compose_backstory("Backstory: Just the story."), "Just the story.");
    }
}
