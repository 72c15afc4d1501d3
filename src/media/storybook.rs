//! Seven-page illustrated craft storybooks.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LlmError, Result, WorkflowError};
use crate::llm::json::parse_json_object;
use crate::llm::{LlmProvider, complete_text};
use crate::store::{GeneratedMediaRecord, MediaStore};

use super::image::{GeneratedImage, ImageGenerator};

pub const STORY_PAGES: u32 = 7;

const STORY_SYSTEM_PROMPT: &str = "You are a storybook generator. Output only valid JSON.";

const ILLUSTRATION_STYLE: &str = "Indian folk-art style, earthy bright tones, quirky expressions, \
patterned motifs (tree, sun, river, huts, borders), simplified illustrations";

/// What the artisan tells us about the product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryInputs {
    pub product: String,
    #[serde(default)]
    pub history: String,
    #[serde(default)]
    pub making: String,
    #[serde(default)]
    pub artisan: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorySection {
    History,
    Making,
    Artisan,
    Closure,
}

impl StorySection {
    /// Section a page belongs to: 1-2 history, 3-4 making, 5-6 artisan, then closure.
    pub fn for_page(page: u32) -> Self {
        match page {
            0..=2 => Self::History,
            3 | 4 => Self::Making,
            5 | 6 => Self::Artisan,
            _ => Self::Closure,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "history" => Some(Self::History),
            "making" => Some(Self::Making),
            "artisan" => Some(Self::Artisan),
            "closure" => Some(Self::Closure),
            _ => None,
        }
    }

    /// Scene description for a page of this section.
    pub fn scene(self, story_text: &str) -> String {
        match self {
            Self::History => format!("Ancient Indian village scene depicting: {story_text}"),
            Self::Making => format!("Artisan crafting process showing: {story_text}"),
            Self::Artisan => format!("Portrait of artisan and family depicting: {story_text}"),
            Self::Closure => format!("Panoramic mural combining all elements: {story_text}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoryPage {
    pub page: u32,
    pub section: StorySection,
    pub story_text: String,
    pub image: Option<GeneratedImage>,
}

#[derive(Debug, Clone)]
pub struct Storybook {
    pub user_id: String,
    pub pages: Vec<StoryPage>,
}

pub fn story_prompt(inputs: &StoryInputs) -> String {
    format!(
        "\
Create a {STORY_PAGES}-page storybook.
Page flow: pages 1-2 History, pages 3-4 Making, pages 5-6 Artisan, page 7 Closure.
For each page write story_text of 2-3 sentences in an oral-tale style.
Return only this JSON format: {{\"pages\": [{{\"section\": \"History\", \"page\": 1, \"story_text\": \"...\"}}]}}

Product: {product}
History: {history}
Making Process: {making}
About Artisan: {artisan}",
        product = inputs.product,
        history = inputs.history,
        making = inputs.making,
        artisan = inputs.artisan,
    )
}

/// Illustration prompt for one page.
pub fn illustration_prompt(page: &StoryPage) -> String {
    format!(
        "{}. {ILLUSTRATION_STYLE}. Continuation of previous scene, same artisan character.",
        page.section.scene(&page.story_text)
    )
}

/// Pull pages out of model output.
///
/// Pages without text are dropped. Missing page numbers follow list order
/// and missing or unknown sections are derived from the page number.
pub fn parse_pages(text: &str) -> Vec<StoryPage> {
    let Some(map) = parse_json_object(text) else {
        return Vec::new();
    };
    let Some(serde_json::Value::Array(raw_pages)) = map.get("pages") else {
        return Vec::new();
    };

    let mut pages: Vec<StoryPage> = raw_pages
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| {
            let story_text = raw.get("story_text")?.as_str()?.trim();
            if story_text.is_empty() {
                return None;
            }
            let page = match raw.get("page") {
                Some(serde_json::Value::Number(n)) => n.as_u64().map(|n| n as u32),
                Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
                _ => None,
            }
            .unwrap_or(index as u32 + 1);
            let section = raw
                .get("section")
                .and_then(|s| s.as_str())
                .and_then(StorySection::parse)
                .unwrap_or_else(|| StorySection::for_page(page));
            Some(StoryPage {
                page,
                section,
                story_text: story_text.to_string(),
                image: None,
            })
        })
        .collect();

    pages.sort_by_key(|p| p.page);
    pages
}

pub struct StorybookGenerator {
    llm: Arc<dyn LlmProvider>,
    images: Arc<dyn ImageGenerator>,
    media: Arc<dyn MediaStore>,
}

impl StorybookGenerator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        images: Arc<dyn ImageGenerator>,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self { llm, images, media }
    }

    /// Write the story, then illustrate it page by page.
    ///
    /// Fails only when no story could be written. A page whose illustration
    /// fails keeps its text and has no image.
    pub async fn generate(&self, user_id: &str, inputs: &StoryInputs) -> Result<Storybook> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(WorkflowError::InvalidIdentity("user_id is required".to_string()).into());
        }
        if inputs.product.trim().is_empty() {
            return Err(WorkflowError::InvalidInput("product is required".to_string()).into());
        }

        let mut pages = self.write_pages(inputs).await?;
        info!(user_id, pages = pages.len(), "Story written");

        if !self.images.is_configured() {
            debug!(user_id, "Image generation disabled, storybook has no illustrations");
            return Ok(Storybook {
                user_id: user_id.to_string(),
                pages,
            });
        }

        // Sequential: each scene continues the previous one.
        for page in &mut pages {
            let prompt = illustration_prompt(page);
            match self.images.generate(&prompt, None).await {
                Ok(image) => {
                    self.record(user_id, page, &prompt, &image).await;
                    page.image = Some(image);
                }
                Err(e) => warn!(user_id, page = page.page, "Page illustration failed: {}", e),
            }
        }

        Ok(Storybook {
            user_id: user_id.to_string(),
            pages,
        })
    }

    async fn write_pages(&self, inputs: &StoryInputs) -> std::result::Result<Vec<StoryPage>, LlmError> {
        let raw = complete_text(
            self.llm.as_ref(),
            STORY_SYSTEM_PROMPT,
            &story_prompt(inputs),
            0.8,
            2048,
        )
        .await?;

        let pages = parse_pages(&raw);
        if pages.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: "story contained no pages".to_string(),
            });
        }
        Ok(pages)
    }

    async fn record(&self, user_id: &str, page: &StoryPage, prompt: &str, image: &GeneratedImage) {
        let record = GeneratedMediaRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            description: Some(page.story_text.clone()),
            prompt_used: prompt.to_string(),
            model_used: Some(image.model.clone()),
            original_image_path: None,
            edited_image_path: None,
            edited_image: Some(image.bytes.clone()),
            created_at: Utc::now(),
        };
        if let Err(e) = self.media.insert_media(&record).await {
            warn!(user_id, page = page.page, "Failed to save storybook page: {}", e);
        }
    }
}
