//! Artisan Assist: onboarding and assistant dialogue engine for artisans.

pub mod api;
pub mod assistant;
pub mod config;
pub mod error;
pub mod llm;
pub mod media;
pub mod onboarding;
pub mod profile;
pub mod search;
pub mod store;
pub mod workflow;
