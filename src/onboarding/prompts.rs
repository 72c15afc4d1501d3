//! Fixed onboarding texts and the LLM prompts used while profiling.

use crate::profile::{ProfileField, ProfileFields};

/// Sent to a brand-new user instead of the first field question.
pub const WELCOME_MESSAGE: &str = "Welcome! I'm your artisan brand assistant. I'll help you set up \
your craft profile, craft a compelling backstory, and support your content. Let's start simple: \
what should I call you or your brand?";

/// Appended to the completion message when a backstory was generated this turn.
pub const BACKSTORY_READY_SUFFIX: &str =
    " I've also crafted your brand backstory. You can fetch it anytime.";

/// The fixed question asked when `field` is the first missing one.
pub fn question_for(field: ProfileField) -> String {
    let question = match field {
        ProfileField::Name => "What should I call your brand or what's your name?",
        ProfileField::State => "Which state/region in India are you based in?",
        ProfileField::CraftType => "What craft do you practice? (e.g., pottery, weaving, woodwork)",
        ProfileField::Materials => "What materials do you mostly use? (e.g., clay, cotton, bamboo)",
        ProfileField::YearsExperience => "How many years have you been practicing this craft?",
        ProfileField::SalesChannels => "Where do you usually sell? Online, offline, or both?",
        ProfileField::PriceRange => "What's your typical price range? (e.g., Rs 200-500, premium)",
        ProfileField::Languages => "Which languages do you speak or want content in?",
        ProfileField::BrandStyle => {
            "How would you describe your brand style or voice? (e.g., earthy, premium)"
        }
    };
    question.to_string()
}

pub fn completion_message(name: Option<&str>, backstory_generated: bool) -> String {
    let mut text = format!("Great! {}, your artisan profile is set.", name.unwrap_or("there"));
    if backstory_generated {
        text.push_str(BACKSTORY_READY_SUFFIX);
    }
    text
}

pub const EXTRACTION_SYSTEM_PROMPT: &str =
    "You are a data extraction assistant for an Indian artisan platform. Output only valid JSON.";

/// Build the profile extraction prompt.
pub fn extraction_prompt(current: &ProfileFields, utterance: &str, missing: &[ProfileField]) -> String {
    let missing_keys: Vec<&str> = missing.iter().map(|f| f.key()).collect();
    let missing_json = serde_json::to_string(&missing_keys).unwrap_or_else(|_| "[]".to_string());

    format!(
        "\
Extract artisan profile information from the user's message. Users may write in English, Hindi, \
Hinglish, or other Indian languages, and may misspell words. Understand the meaning instead of \
matching keywords.

Current profile: {current}
User message: {utterance}
Missing fields: {missing_json}

Fields (extract any that are mentioned):
- name: full name or shop name (\"Mera naam Priya hai\", \"My shop is called Kala Creations\")
- state: Indian state/UT; infer it from a city (\"Main Jaipur se hoon\" -> Rajasthan)
- craft_type: primary craft (pottery / mitti ka kaam, weaving / bunaai, embroidery / kadai, woodwork / lakdi ka kaam)
- materials: main materials (clay / mitti, cotton / sooti, wood / lakdi, brass / peetal, silk / resham)
- years_experience: years of practice as digits (\"dus saal\" -> 10, \"paanch saal\" -> 5)
- sales_channels: where they sell (Instagram, Etsy, mela, bazaar, exhibitions)
- price_range: typical price (\"500 rupaye tak\", \"around 200-500\", \"premium\")
- languages: languages spoken (\"Hindi aur thodi English\")
- brand_style: feel or voice of the brand (earthy, minimalist, premium, traditional / paramparik, vibrant / rangeen)

Normalization rules:
- mela, bazaar, exhibition or local shop -> sales_channels \"offline\"
- Instagram, website, Etsy or any online store -> sales_channels \"online\"
- both kinds mentioned -> sales_channels \"both\"
- number words in any language -> digit strings
- one message may fill several fields at once (\"Main Ravi, UP se, lakdi ka kaam 10 saal se\")

Use plain string values only, never lists or nested objects.
Return a single JSON object with only the fields you found, or {{}} if none.",
        current = current.to_json(),
    )
}

pub const BACKSTORY_SYSTEM_PROMPT: &str = "You are a brand storyteller for Indian artisans.";

/// Build the backstory prompt. The reply is expected in labeled sections.
pub fn backstory_prompt(fields: &ProfileFields) -> String {
    let get = |field| fields.get(field).unwrap_or("");
    format!(
        "\
Create a compelling artisan backstory.

Details:
Name/Brand: {name}
State/Region: {state}
Craft: {craft}
Materials: {materials}
Experience (years): {years}
Sales Channels: {channels}
Brand Style: {style}
Languages: {languages}

Write in simple, sincere language. Avoid cliches and marketing fluff.
Output exactly these two sections and nothing else:

Backstory: <120-180 words>
Tagline: <one short line>",
        name = get(ProfileField::Name),
        state = get(ProfileField::State),
        craft = get(ProfileField::CraftType),
        materials = get(ProfileField::Materials),
        years = get(ProfileField::YearsExperience),
        channels = get(ProfileField::SalesChannels),
        style = get(ProfileField::BrandStyle),
        languages = get(ProfileField::Languages),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_field_has_a_fixed_question() {
        for field in ProfileField::ALL {
            let q = question_for(field);
            assert!(!q.is_empty());
            assert!(!q.starts_with("Please provide"));
        }
        assert_eq!(
            question_for(ProfileField::YearsExperience),
            "How many years have you been practicing this craft?"
        );
    }

    #[test]
    fn completion_message_variants() {
        assert_eq!(
            completion_message(Some("Asha"), false),
            "Great! Asha, your artisan profile is set."
        );
        let with_story = completion_message(Some("Asha"), true);
        assert!(with_story.ends_with("You can fetch it anytime."));
        assert!(completion_message(None, false).contains("there"));
    }

    #[test]
    fn extraction_prompt_lists_missing_and_message() {
        let mut current = ProfileFields::default();
        current.set(ProfileField::Name, "Ravi");
        let prompt = extraction_prompt(
            &current,
            "UP se hoon",
            &[ProfileField::State, ProfileField::CraftType],
        );
        assert!(prompt.contains("UP se hoon"));
        assert!(prompt.contains(r#"["state","craft_type"]"#));
        assert!(prompt.contains("Ravi"));
        assert!(prompt.contains("{}"));
    }

    #[test]
    fn backstory_prompt_includes_profile() {
        let mut fields = ProfileFields::default();
        fields.set(ProfileField::CraftType, "Dokra metal casting");
        let prompt = backstory_prompt(&fields);
        assert!(prompt.contains("Craft: Dokra metal casting"));
        assert!(prompt.contains("Tagline:"));
    }
}
