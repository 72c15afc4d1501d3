//! OnboardingManager: the slot-filling state machine.
//!
//! Each turn the manager re-derives whether the user is still onboarding from
//! the stored profile, merges whatever the extractor found in the latest
//! utterance, and either asks for the first missing field or completes the
//! profile (saving it and generating the backstory once).

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::WorkflowError;
use crate::llm::LlmProvider;
use crate::profile::{ProfileField, ProfileFields, UserProfile};
use crate::store::ProfileStore;

use super::backstory::BackstoryGenerator;
use super::extractor::{Extraction, ProfileExtractor, scan_first_number};
use super::prompts::{WELCOME_MESSAGE, completion_message, question_for};

/// Result of the per-turn profile check.
#[derive(Debug, Clone)]
pub struct ProfileCheck {
    pub is_onboarding: bool,
    /// The stored profile, complete or not.
    pub profile: Option<UserProfile>,
}

/// Result of one onboarding step.
#[derive(Debug, Clone)]
pub struct OnboardingOutcome {
    /// Partial (or complete) profile after merging this turn's extraction.
    pub fields: ProfileFields,
    /// Reply for the user: welcome, next question, or completion message.
    pub message: String,
    /// Whether the profile became complete (and was saved) this turn.
    pub done: bool,
    /// Backstory generated this turn, if any.
    pub backstory: Option<String>,
}

pub struct OnboardingManager {
    profiles: Arc<dyn ProfileStore>,
    extractor: ProfileExtractor,
    backstory: BackstoryGenerator,
}

impl OnboardingManager {
    pub fn new(profiles: Arc<dyn ProfileStore>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            profiles,
            extractor: ProfileExtractor::new(llm.clone()),
            backstory: BackstoryGenerator::new(llm),
        }
    }

    /// Decide whether `user_id` is still onboarding.
    ///
    /// Store read errors count as "no profile".
    pub async fn check(&self, user_id: &str) -> ProfileCheck {
        match self.profiles.get_profile(user_id).await {
            Ok(Some(profile)) => ProfileCheck {
                is_onboarding: !profile.is_complete(),
                profile: Some(profile),
            },
            Ok(None) => ProfileCheck {
                is_onboarding: true,
                profile: None,
            },
            Err(e) => {
                warn!(user_id, "Profile lookup failed, treating as onboarding: {}", e);
                ProfileCheck {
                    is_onboarding: true,
                    profile: None,
                }
            }
        }
    }

    /// Run one onboarding turn.
    ///
    /// `first_contact` is true when the user has sent at most one message and
    /// nothing is known about them yet; if the utterance yields no fields the
    /// welcome text is returned instead of a question.
    ///
    /// Only a failed profile save is an error.
    pub async fn step(
        &self,
        user_id: &str,
        partial: &ProfileFields,
        utterance: Option<&str>,
        first_contact: bool,
    ) -> Result<OnboardingOutcome, WorkflowError> {
        let mut fields = partial.clone();

        if let Some(utterance) = utterance.map(str::trim).filter(|u| !u.is_empty()) {
            let missing = fields.missing();
            match self.extractor.extract(&fields, utterance, &missing).await {
                Extraction::Parsed(updates) => fields.merge(&updates),
                Extraction::Unparsed => {
                    if missing.first() == Some(&ProfileField::YearsExperience) {
                        if let Some(years) = scan_first_number(utterance) {
                            debug!(user_id, years = %years, "Numeric fallback for years_experience");
                            fields.set(ProfileField::YearsExperience, years);
                        }
                    }
                }
            }
        }

        if first_contact && fields == *partial {
            return Ok(OnboardingOutcome {
                fields,
                message: WELCOME_MESSAGE.to_string(),
                done: false,
                backstory: None,
            });
        }

        let Some(next) = fields.first_missing() else {
            return self.complete(user_id, fields).await;
        };

        debug!(user_id, field = %next, "Asking for next profile field");
        Ok(OnboardingOutcome {
            fields,
            message: question_for(next),
            done: false,
            backstory: None,
        })
    }

    async fn complete(
        &self,
        user_id: &str,
        fields: ProfileFields,
    ) -> Result<OnboardingOutcome, WorkflowError> {
        self.profiles.upsert_profile(user_id, &fields).await?;
        info!(user_id, "Artisan profile completed");

        let backstory = self.backstory_once(user_id, &fields).await;
        let message = completion_message(fields.get(ProfileField::Name), backstory.is_some());

        Ok(OnboardingOutcome {
            fields,
            message,
            done: true,
            backstory,
        })
    }

    /// Generate and store a backstory unless one already exists.
    ///
    /// A failed existence check skips generation so a backstory is never
    /// produced twice.
    async fn backstory_once(&self, user_id: &str, fields: &ProfileFields) -> Option<String> {
        match self.profiles.get_profile(user_id).await {
            Ok(Some(profile)) if profile.has_backstory() => {
                debug!(user_id, "Backstory already exists, not regenerating");
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(user_id, "Backstory existence check failed, skipping generation: {}", e);
                return None;
            }
        }

        let text = match self.backstory.generate(fields).await {
            Ok(text) => text,
            Err(e) => {
                warn!(user_id, "Backstory generation failed: {}", e);
                return None;
            }
        };

        match self.profiles.set_backstory(user_id, &text).await {
            Ok(()) => {
                info!(user_id, "Backstory saved");
                Some(text)
            }
            Err(e) => {
                warn!(user_id, "Failed to save backstory: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::error::{DatabaseError, LlmError};
    use crate::llm::{CompletionRequest, CompletionResponse, FinishReason};
    use crate::onboarding::prompts::EXTRACTION_SYSTEM_PROMPT;

    /// Replies to extraction prompts with `extraction` and to anything else
    /// with `backstory`, counting backstory calls.
    struct ScriptedLlm {
        extraction: String,
        backstory: Result<String, ()>,
        backstory_calls: AtomicU32,
    }

    impl ScriptedLlm {
        fn new(extraction: &str) -> Self {
            Self {
                extraction: extraction.to_string(),
                backstory: Ok("Backstory: Made by hand.\nTagline: Rooted in clay.".to_string()),
                backstory_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }
        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }
        async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let is_extraction = req.messages[0].content == EXTRACTION_SYSTEM_PROMPT;
            let content = if is_extraction {
                self.extraction.clone()
            } else {
                self.backstory_calls.fetch_add(1, Ordering::SeqCst);
                self.backstory.clone().map_err(|_| LlmError::RequestFailed {
                    provider: "scripted".into(),
                    reason: "down".into(),
                })?
            };
            Ok(CompletionResponse {
                content,
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    #[derive(Default)]
    struct MemoryProfiles {
        profiles: Mutex<HashMap<String, UserProfile>>,
        fail_reads: bool,
        fail_writes: bool,
    }

    #[async_trait]
    impl ProfileStore for MemoryProfiles {
        async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, DatabaseError> {
            if self.fail_reads {
                return Err(DatabaseError::Query("unavailable".into()));
            }
            Ok(self.profiles.lock().unwrap().get(user_id).cloned())
        }
        async fn upsert_profile(
            &self,
            user_id: &str,
            fields: &ProfileFields,
        ) -> Result<(), DatabaseError> {
            if self.fail_writes {
                return Err(DatabaseError::Query("read-only".into()));
            }
            let mut map = self.profiles.lock().unwrap();
            let now = Utc::now();
            let entry = map.entry(user_id.to_string()).or_insert_with(|| UserProfile {
                user_id: user_id.to_string(),
                fields: ProfileFields::default(),
                backstory: None,
                created_at: now,
                updated_at: now,
            });
            entry.fields = fields.clone();
            entry.updated_at = now;
            Ok(())
        }
        async fn set_backstory(&self, user_id: &str, backstory: &str) -> Result<(), DatabaseError> {
            let mut map = self.profiles.lock().unwrap();
            match map.get_mut(user_id) {
                Some(p) => {
                    p.backstory = Some(backstory.to_string());
                    Ok(())
                }
                None => Err(DatabaseError::NotFound {
                    entity: "user_profile".into(),
                    id: user_id.into(),
                }),
            }
        }
        async fn delete_profile(&self, user_id: &str) -> Result<bool, DatabaseError> {
            Ok(self.profiles.lock().unwrap().remove(user_id).is_some())
        }
    }

    fn all_but(field: ProfileField) -> ProfileFields {
        let mut fields = ProfileFields::default();
        for f in ProfileField::ALL {
            if f != field {
                fields.set(f, format!("{f}-value"));
            }
        }
        fields
    }

    fn manager(store: Arc<MemoryProfiles>, llm: Arc<ScriptedLlm>) -> OnboardingManager {
        OnboardingManager::new(store, llm)
    }

    #[tokio::test]
    async fn check_without_profile_is_onboarding() {
        let mgr = manager(Arc::default(), Arc::new(ScriptedLlm::new("{}")));
        let check = mgr.check("u1").await;
        assert!(check.is_onboarding);
        assert!(check.profile.is_none());
    }

    #[tokio::test]
    async fn check_read_error_degrades_to_onboarding() {
        let store = Arc::new(MemoryProfiles {
            fail_reads: true,
            ..Default::default()
        });
        let mgr = manager(store, Arc::new(ScriptedLlm::new("{}")));
        assert!(mgr.check("u1").await.is_onboarding);
    }

    #[tokio::test]
    async fn first_contact_hi_gets_welcome() {
        let mgr = manager(Arc::default(), Arc::new(ScriptedLlm::new("{}")));
        let out = mgr
            .step("u1", &ProfileFields::default(), Some("Hi"), true)
            .await
            .unwrap();
        assert_eq!(out.message, WELCOME_MESSAGE);
        assert!(!out.done);
        assert!(out.fields.is_empty());
    }

    #[tokio::test]
    async fn first_contact_with_info_asks_next_field() {
        let mgr = manager(
            Arc::default(),
            Arc::new(ScriptedLlm::new(r#"{"name": "Ravi", "state": "Uttar Pradesh"}"#)),
        );
        let out = mgr
            .step("u1", &ProfileFields::default(), Some("Main Ravi, UP se"), true)
            .await
            .unwrap();
        assert_eq!(out.message, question_for(ProfileField::CraftType));
        assert_eq!(out.fields.get(ProfileField::Name), Some("Ravi"));
    }

    #[tokio::test]
    async fn same_missing_field_same_question() {
        let mgr = manager(Arc::default(), Arc::new(ScriptedLlm::new("{}")));
        let partial = all_but(ProfileField::PriceRange);
        let a = mgr.step("u1", &partial, Some("hmm"), false).await.unwrap();
        let b = mgr.step("u1", &partial, Some("what?"), false).await.unwrap();
        assert_eq!(a.message, b.message);
        assert_eq!(a.message, question_for(ProfileField::PriceRange));
    }

    #[tokio::test]
    async fn unparsable_extraction_for_non_numeric_field_changes_nothing() {
        let mgr = manager(Arc::default(), Arc::new(ScriptedLlm::new("sorry, no idea 42")));
        let partial = all_but(ProfileField::Languages);
        let out = mgr.step("u1", &partial, Some("42"), false).await.unwrap();
        assert_eq!(out.fields, partial);
        assert_eq!(out.message, question_for(ProfileField::Languages));
    }

    #[tokio::test]
    async fn numeric_fallback_completes_profile() {
        let store = Arc::new(MemoryProfiles::default());
        let llm = Arc::new(ScriptedLlm::new("not json"));
        let mgr = manager(store.clone(), llm.clone());
        let partial = all_but(ProfileField::YearsExperience);

        let out = mgr
            .step("u1", &partial, Some("paanch saal se"), false)
            .await
            .unwrap();

        assert!(out.done);
        assert_eq!(out.fields.get(ProfileField::YearsExperience), Some("5"));
        assert!(out.message.starts_with("Great! name-value, your artisan profile is set."));
        assert_eq!(
            out.backstory.as_deref(),
            Some("Made by hand.\n\nTagline: Rooted in clay.")
        );
        let stored = store.get_profile("u1").await.unwrap().unwrap();
        assert!(stored.is_complete());
        assert!(stored.has_backstory());
    }

    #[tokio::test]
    async fn backstory_generated_at_most_once() {
        let store = Arc::new(MemoryProfiles::default());
        let llm = Arc::new(ScriptedLlm::new(r#"{"brand_style": "earthy"}"#));
        let mgr = manager(store.clone(), llm.clone());
        let partial = all_but(ProfileField::BrandStyle);

        let first = mgr.step("u1", &partial, Some("earthy"), false).await.unwrap();
        let second = mgr.step("u1", &partial, Some("earthy"), false).await.unwrap();

        assert!(first.backstory.is_some());
        assert!(second.done);
        assert!(second.backstory.is_none());
        assert!(!second.message.contains("backstory"));
        assert_eq!(llm.backstory_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backstory_failure_still_completes() {
        let store = Arc::new(MemoryProfiles::default());
        let llm = Arc::new(ScriptedLlm {
            backstory: Err(()),
            ..ScriptedLlm::new(r#"{"brand_style": "premium"}"#)
        });
        let mgr = manager(store.clone(), llm);
        let out = mgr
            .step("u1", &all_but(ProfileField::BrandStyle), Some("premium"), false)
            .await
            .unwrap();
        assert!(out.done);
        assert!(out.backstory.is_none());
        assert_eq!(out.message, "Great! name-value, your artisan profile is set.");
        assert!(store.get_profile("u1").await.unwrap().unwrap().is_complete());
    }

    #[tokio::test]
    async fn profile_write_failure_propagates() {
        let store = Arc::new(MemoryProfiles {
            fail_writes: true,
            ..Default::default()
        });
        let mgr = manager(store, Arc::new(ScriptedLlm::new(r#"{"brand_style": "premium"}"#)));
        let err = mgr
            .step("u1", &all_but(ProfileField::BrandStyle), Some("premium"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Storage(_)));
    }

    #[tokio::test]
    async fn extraction_never_clears_existing_fields() {
        let mgr = manager(
            Arc::default(),
            Arc::new(ScriptedLlm::new(r#"{"name": "", "materials": "bamboo"}"#)),
        );
        let mut partial = ProfileFields::default();
        partial.set(ProfileField::Name, "Asha");
        let out = mgr.step("u1", &partial, Some("bamboo"), false).await.unwrap();
        assert_eq!(out.fields.get(ProfileField::Name), Some("Asha"));
        assert_eq!(out.fields.get(ProfileField::Materials), Some("bamboo"));
    }
}
