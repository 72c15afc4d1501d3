//! Profile extraction from free-text utterances.
//!
//! The LLM does the natural-language work; this module only builds the
//! prompt and parses the reply defensively. A small number scanner covers
//! the years-of-experience question when the model reply is unusable.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::llm::json::parse_json_object;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::profile::{ProfileField, ProfileFields};

use super::prompts::{EXTRACTION_SYSTEM_PROMPT, extraction_prompt};

const EXTRACTION_MAX_TOKENS: u32 = 512;
const EXTRACTION_TEMPERATURE: f32 = 0.0;

/// Outcome of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The model returned a JSON object; it may hold zero fields.
    Parsed(ProfileFields),
    /// No usable JSON object (or the call failed).
    Unparsed,
}

impl Extraction {
    pub fn fields(&self) -> Option<&ProfileFields> {
        match self {
            Self::Parsed(fields) => Some(fields),
            Self::Unparsed => None,
        }
    }
}

pub struct ProfileExtractor {
    llm: Arc<dyn LlmProvider>,
}

impl ProfileExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Extract profile fields from `utterance`. Never fails.
    pub async fn extract(
        &self,
        current: &ProfileFields,
        utterance: &str,
        missing: &[ProfileField],
    ) -> Extraction {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(extraction_prompt(current, utterance, missing)),
        ])
        .with_max_tokens(EXTRACTION_MAX_TOKENS)
        .with_temperature(EXTRACTION_TEMPERATURE);

        match self.llm.complete(request).await {
            Ok(response) => {
                let extraction = parse_extraction(&response.content);
                match &extraction {
                    Extraction::Parsed(fields) => {
                        debug!(fields = ?fields.to_string_map(), "Extracted profile fields");
                    }
                    Extraction::Unparsed => {
                        warn!(raw = %response.content, "Extraction reply had no JSON object");
                    }
                }
                extraction
            }
            Err(e) => {
                warn!("Profile extraction call failed: {}", e);
                Extraction::Unparsed
            }
        }
    }
}

/// Parse a model reply into profile fields.
///
/// Unknown keys, nulls, lists and nested objects are dropped. Numbers are
/// kept as their decimal string.
pub fn parse_extraction(text: &str) -> Extraction {
    let Some(map) = parse_json_object(text) else {
        return Extraction::Unparsed;
    };

    let mut fields = ProfileFields::default();
    for (key, value) in map {
        let Some(field) = ProfileField::from_key(&key) else {
            continue;
        };
        match value {
            serde_json::Value::String(s) => fields.set(field, s),
            serde_json::Value::Number(n) => fields.set(field, n.to_string()),
            _ => {}
        }
    }
    Extraction::Parsed(fields)
}

static NUMBER_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+|[A-Za-z]+").expect("valid number token regex"));

/// Words that are numbers only when followed by a word for "years".
const AMBIGUOUS_NUMBER_WORDS: &[&str] = &["do", "che", "nau", "tin", "sat", "bees"];

const YEAR_WORDS: &[&str] = &["saal", "sal", "saalon", "varsh", "baras", "year", "years", "yrs", "yr"];

fn number_word(word: &str) -> Option<u32> {
    let n = match word {
        "one" | "ek" => 1,
        "two" | "do" => 2,
        "three" | "teen" | "tin" => 3,
        "four" | "char" | "chaar" => 4,
        "five" | "paanch" | "panch" | "paach" => 5,
        "six" | "chhe" | "che" | "chhah" => 6,
        "seven" | "saat" | "sat" => 7,
        "eight" | "aath" | "ath" => 8,
        "nine" | "nau" => 9,
        "ten" | "das" | "dus" => 10,
        "eleven" | "gyarah" | "gyara" => 11,
        "twelve" | "barah" | "bara" => 12,
        "thirteen" | "terah" => 13,
        "fourteen" | "chaudah" => 14,
        "fifteen" | "pandrah" | "pandra" => 15,
        "sixteen" | "solah" => 16,
        "seventeen" | "satrah" => 17,
        "eighteen" | "atharah" => 18,
        "nineteen" | "unnis" => 19,
        "twenty" | "bees" => 20,
        "twentyfive" | "pachees" | "pachchis" => 25,
        "thirty" | "tees" => 30,
        "forty" | "chalis" | "chaalis" => 40,
        "fifty" | "pachas" | "pachaas" => 50,
        _ => return None,
    };
    Some(n)
}

/// Find the first number in an utterance, as a digit string.
///
/// Accepts ASCII digits and English or romanized Hindi number words
/// ("paanch saal se" -> "5"). Short words that are also ordinary words
/// ("do") count only when a word for years follows.
pub fn scan_first_number(utterance: &str) -> Option<String> {
    let tokens: Vec<&str> = NUMBER_TOKEN_RE
        .find_iter(utterance)
        .map(|m| m.as_str())
        .collect();

    for (i, token) in tokens.iter().enumerate() {
        if token.bytes().all(|b| b.is_ascii_digit()) {
            return Some(
                token
                    .parse::<u64>()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|_| token.to_string()),
            );
        }

        let word = token.to_ascii_lowercase();
        let Some(n) = number_word(&word) else {
            continue;
        };
        if AMBIGUOUS_NUMBER_WORDS.contains(&word.as_str()) {
            let followed_by_years = tokens
                .get(i + 1)
                .is_some_and(|next| YEAR_WORDS.contains(&next.to_ascii_lowercase().as_str()));
            if !followed_by_years {
                continue;
            }
        }
        return Some(n.to_string());
    }
    None
}
