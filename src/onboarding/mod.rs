//! Artisan onboarding: slot-filling profile extraction, the onboarding state
//! machine, and one-time backstory generation.

pub mod backstory;
pub mod extractor;
pub mod manager;
pub mod prompts;

pub use backstory::BackstoryGenerator;
pub use extractor::{Extraction, ProfileExtractor};
pub use manager::{OnboardingManager, OnboardingOutcome, ProfileCheck};
pub use prompts::WELCOME_MESSAGE;
