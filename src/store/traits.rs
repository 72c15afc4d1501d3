//! Storage contracts for profiles, conversation logs, media and checkpoints.
//!
//! One backend (`LibSqlBackend`) implements all four; components take only
//! the trait they need.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::profile::{ProfileFields, UserProfile};
use crate::workflow::state::{ConversationState, MessageRole};

/// Durable artisan profiles, one per user.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch a profile, `None` if the user has none.
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, DatabaseError>;

    /// Insert the profile or overwrite every field of the existing one.
    /// The backstory is left untouched.
    async fn upsert_profile(&self, user_id: &str, fields: &ProfileFields)
    -> Result<(), DatabaseError>;

    /// Replace the backstory of an existing profile.
    async fn set_backstory(&self, user_id: &str, backstory: &str) -> Result<(), DatabaseError>;

    /// Delete the profile. Returns whether one existed.
    async fn delete_profile(&self, user_id: &str) -> Result<bool, DatabaseError>;
}

/// A logged chat message.
#[derive(Debug, Clone)]
pub struct ConversationEntry {
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only per-user message log.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn append_message(
        &self,
        user_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), DatabaseError>;

    /// Newest first.
    async fn recent_messages(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationEntry>, DatabaseError>;

    /// Remove the user's log. Returns the number of rows removed.
    async fn clear_messages(&self, user_id: &str) -> Result<u64, DatabaseError>;
}

/// Metadata (and optionally bytes) of a generated image.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedMediaRecord {
    pub id: Uuid,
    pub user_id: String,
    pub description: Option<String>,
    pub prompt_used: String,
    pub model_used: Option<String>,
    pub original_image_path: Option<String>,
    pub edited_image_path: Option<String>,
    pub edited_image: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

/// Append-only media records.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn insert_media(&self, record: &GeneratedMediaRecord) -> Result<Uuid, DatabaseError>;

    /// Newest first.
    async fn list_media(&self, user_id: &str) -> Result<Vec<GeneratedMediaRecord>, DatabaseError>;
}

/// Conversation state keyed by conversation identity.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load_checkpoint(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationState>, DatabaseError>;

    async fn save_checkpoint(
        &self,
        conversation_id: &str,
        state: &ConversationState,
    ) -> Result<(), DatabaseError>;

    /// Drop every checkpoint owned by the user. Returns how many were removed.
    async fn delete_checkpoints_for_user(&self, user_id: &str) -> Result<u64, DatabaseError>;
}
