//! General conversational answers.

use std::sync::Arc;

use tracing::warn;

use crate::llm::{LlmProvider, complete_text};
use crate::profile::ProfileFields;

const GENERAL_SYSTEM_PROMPT: &str =
    "You are a friendly assistant for Indian artisans. Your answers are read aloud.";

pub const GENERAL_FAILED_MESSAGE: &str =
    "Sorry, I'm having trouble answering right now. Could you ask me again in a moment?";

pub struct GeneralQueryHandler {
    llm: Arc<dyn LlmProvider>,
}

impl GeneralQueryHandler {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn handle(&self, profile: &ProfileFields, query: &str) -> String {
        let prompt = format!(
            "\
Answer naturally and conversationally, as if speaking to someone in person.
Do not use emojis, bullet points, numbered lists, headings or bold text.
Keep the answer under 100 words.

User Profile: {profile}
Question: {query}

If the question touches on welfare schemes or support for artisans, focus on that.",
            profile = profile.to_json(),
        );

        match complete_text(self.llm.as_ref(), GENERAL_SYSTEM_PROMPT, &prompt, 0.5, 300).await {
            Ok(answer) if !answer.is_empty() => answer,
            Ok(_) => GENERAL_FAILED_MESSAGE.to_string(),
            Err(e) => {
                warn!("General query failed: {}", e);
                GENERAL_FAILED_MESSAGE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::test_support::RecordingLlm;
    use crate::profile::ProfileField;

    #[tokio::test]
    async fn answers_with_profile_context() {
        let llm = Arc::new(RecordingLlm::replying("You're welcome, happy to help."));
        let handler = GeneralQueryHandler::new(llm.clone());
        let mut profile = ProfileFields::default();
        profile.set(ProfileField::CraftType, "weaving");

        let answer = handler.handle(&profile, "thank you").await;

        assert_eq!(answer, "You're welcome, happy to help.");
        let prompt = llm.last_prompt();
        assert!(prompt.contains("weaving"));
        assert!(prompt.contains("under 100 words"));
    }

    #[tokio::test]
    async fn failure_is_friendly_text() {
        let handler = GeneralQueryHandler::new(Arc::new(RecordingLlm::failing()));
        let answer = handler.handle(&ProfileFields::default(), "hello").await;
        assert_eq!(answer, GENERAL_FAILED_MESSAGE);
    }
}
