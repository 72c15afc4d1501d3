//! Welfare-scheme search: web search plus a spoken-style summary.

use std::sync::Arc;

use tracing::{info, warn};

use crate::llm::{LlmProvider, complete_text};
use crate::profile::{ProfileField, ProfileFields};
use crate::search::{SearchResult, SearchTool};

/// Results handed to the summarizer.
const TOP_RESULTS: usize = 3;

const SUMMARY_SYSTEM_PROMPT: &str =
    "You explain Indian government welfare schemes to artisans in plain spoken language.";

/// Returned whenever the search or the summary fails.
pub const SEARCH_FAILED_MESSAGE: &str = "Sorry, I couldn't look up welfare schemes right now. \
Please try asking again in a little while.";

pub const NO_RESULTS_MESSAGE: &str = "I couldn't find any welfare schemes matching that question. \
Could you tell me a bit more about what kind of support you are looking for?";

pub struct WelfareSearchHandler {
    llm: Arc<dyn LlmProvider>,
    search: Arc<dyn SearchTool>,
}

/// Combine the user's query with the profile's region and craft.
pub fn build_search_query(query: &str, profile: &ProfileFields) -> String {
    let context: Vec<&str> = [ProfileField::State, ProfileField::CraftType]
        .into_iter()
        .filter_map(|f| profile.get(f))
        .collect();

    if context.is_empty() {
        format!("{query} Indian government welfare schemes for artisans")
    } else {
        format!(
            "{query} Indian welfare schemes for {} artisans",
            context.join(" ")
        )
    }
}

impl WelfareSearchHandler {
    pub fn new(llm: Arc<dyn LlmProvider>, search: Arc<dyn SearchTool>) -> Self {
        Self { llm, search }
    }

    /// Answer a welfare question. Failures become a friendly message.
    pub async fn handle(&self, profile: &ProfileFields, query: &str) -> String {
        let search_query = build_search_query(query, profile);

        let mut results = match self.search.search(&search_query).await {
            Ok(results) => results,
            Err(e) => {
                warn!(query = %search_query, "Welfare search failed: {}", e);
                return SEARCH_FAILED_MESSAGE.to_string();
            }
        };
        results.truncate(TOP_RESULTS);
        info!(results = results.len(), "Welfare search returned results");

        if results.is_empty() {
            return NO_RESULTS_MESSAGE.to_string();
        }

        let prompt = summary_prompt(profile, query, &results);
        match complete_text(self.llm.as_ref(), SUMMARY_SYSTEM_PROMPT, &prompt, 0.3, 400).await {
            Ok(summary) if !summary.is_empty() => summary,
            Ok(_) => SEARCH_FAILED_MESSAGE.to_string(),
            Err(e) => {
                warn!("Welfare summary failed: {}", e);
                SEARCH_FAILED_MESSAGE.to_string()
            }
        }
    }
}

fn summary_prompt(profile: &ProfileFields, query: &str, results: &[SearchResult]) -> String {
    let results_json = serde_json::to_string(results).unwrap_or_else(|_| "[]".to_string());
    format!(
        "\
Give a natural, conversational answer about welfare schemes based on the search results.
Sound like you are speaking to someone, with no emojis or bullet points.
Keep it under 150 words and focus on eligibility and benefits.

User Profile: {profile}
Query: {query}
Search Results: {results_json}",
        profile = profile.to_json(),
    )
}
