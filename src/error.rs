//! Error types for Artisan Assist.

use std::time::Duration;

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. } | Self::RateLimited { .. } | Self::Timeout { .. }
        )
    }
}

/// Web search errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search is not configured")]
    NotConfigured,

    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid search response: {0}")]
    InvalidResponse(String),
}

/// Image generation / editing errors.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Image generation is not configured")]
    NotConfigured,

    #[error("Model {model} request failed: {reason}")]
    RequestFailed { model: String, reason: String },

    #[error("Model {model} returned no image")]
    NoImage { model: String },

    #[error("All image models failed; last error: {0}")]
    AllModelsFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the turn workflow and the identity-keyed operations.
///
/// Only `InvalidIdentity` and `NotFound` are client errors; everything else
/// is a server-side failure that could not be degraded into a reply.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("{entity} not found for {id}")]
    NotFound { entity: String, id: String },

    #[error("Storage failure: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for the assistant.
pub type Result<T> = std::result::Result<T, Error>;
