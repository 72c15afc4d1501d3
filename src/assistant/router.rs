//! Intent classification for post-onboarding queries.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::{LlmProvider, complete_text};
use crate::profile::ProfileFields;
use crate::workflow::state::Intent;

const ROUTER_SYSTEM_PROMPT: &str = "You classify user intent for an artisan welfare assistant.";

/// Map free-form classifier output to an intent.
///
/// Any mention of "welfare", "scheme" or "benefit" (case-insensitive) means
/// welfare search; everything else is a general query.
pub fn intent_from_label(raw: &str) -> Intent {
    let label = raw.to_lowercase();
    if ["welfare", "scheme", "benefit"]
        .iter()
        .any(|needle| label.contains(needle))
    {
        Intent::WelfareSearch
    } else {
        Intent::GeneralQuery
    }
}

pub struct IntentRouter {
    llm: Arc<dyn LlmProvider>,
}

impl IntentRouter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Classify `query`. A failed LLM call falls back to a general query.
    pub async fn classify(&self, profile: &ProfileFields, query: &str) -> Intent {
        let prompt = format!(
            "\
Classify the user's intent:
- 'welfare_search': questions about government schemes, benefits, subsidies or eligibility
- 'general_query': anything else

User Profile: {profile}
Query: {query}

Respond with the intent only.",
            profile = profile.to_json(),
        );

        match complete_text(self.llm.as_ref(), ROUTER_SYSTEM_PROMPT, &prompt, 0.0, 16).await {
            Ok(label) => {
                let intent = intent_from_label(&label);
                debug!(label = %label, %intent, "Classified intent");
                intent
            }
            Err(e) => {
                warn!("Intent classification failed, using general query: {}", e);
                Intent::GeneralQuery
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::test_support::RecordingLlm;

    #[test]
    fn label_matching_is_substring_and_case_insensitive() {
        assert_eq!(intent_from_label("welfare_search"), Intent::WelfareSearch);
        assert_eq!(intent_from_label("  WELFARE_SEARCH\n"), Intent::WelfareSearch);
        assert_eq!(intent_from_label("This is about a Scheme."), Intent::WelfareSearch);
        assert_eq!(intent_from_label("benefits"), Intent::WelfareSearch);
        assert_eq!(intent_from_label("general_query"), Intent::GeneralQuery);
        assert_eq!(intent_from_label(""), Intent::GeneralQuery);
    }

    #[tokio::test]
    async fn classify_uses_llm_label() {
        let llm = Arc::new(RecordingLlm::replying("welfare_search"));
        let router = IntentRouter::new(llm.clone());
        let intent = router
            .classify(&ProfileFields::default(), "what is PM Kisan scheme")
            .await;
        assert_eq!(intent, Intent::WelfareSearch);
        assert!(llm.last_prompt().contains("what is PM Kisan scheme"));
    }

    #[tokio::test]
    async fn classify_failure_is_general_query() {
        let router = IntentRouter::new(Arc::new(RecordingLlm::failing()));
        let intent = router.classify(&ProfileFields::default(), "thank you").await;
        assert_eq!(intent, Intent::GeneralQuery);
    }
}
