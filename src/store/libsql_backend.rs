//! libSQL backend implementing every storage trait.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::profile::{ProfileField, ProfileFields, UserProfile};
use crate::store::migrations;
use crate::store::traits::{
    CheckpointStore, ConversationEntry, ConversationLog, GeneratedMediaRecord, MediaStore,
    ProfileStore,
};
use crate::workflow::state::{ConversationState, MessageRole};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_blob(bytes: Option<&[u8]>) -> libsql::Value {
    match bytes {
        Some(b) => libsql::Value::Blob(b.to_vec()),
        None => libsql::Value::Null,
    }
}

const PROFILE_COLUMNS: &str = "user_id, name, state, craft_type, materials, years_experience, \
     sales_channels, price_range, languages, brand_style, backstory, created_at, updated_at";

/// Map a `user_profiles` row (selected with `PROFILE_COLUMNS`).
fn row_to_profile(row: &libsql::Row) -> Result<UserProfile, DatabaseError> {
    let user_id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("profile user_id: {e}")))?;

    let mut fields = ProfileFields::default();
    for (offset, field) in ProfileField::ALL.into_iter().enumerate() {
        if let Ok(value) = row.get::<String>(offset as i32 + 1) {
            fields.set(field, value);
        }
    }

    let backstory: Option<String> = row.get(10).ok();
    let created_str: String = row.get(11).unwrap_or_default();
    let updated_str: String = row.get(12).unwrap_or_default();

    Ok(UserProfile {
        user_id,
        fields,
        backstory: backstory.filter(|b| !b.trim().is_empty()),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_media(row: &libsql::Row) -> Result<GeneratedMediaRecord, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("media id: {e}")))?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| DatabaseError::Serialization(format!("media id '{id_str}': {e}")))?;
    let created_str: String = row.get(8).unwrap_or_default();

    Ok(GeneratedMediaRecord {
        id,
        user_id: row.get(1).unwrap_or_default(),
        description: row.get(2).ok(),
        prompt_used: row.get(3).unwrap_or_default(),
        model_used: row.get(4).ok(),
        original_image_path: row.get(5).ok(),
        edited_image_path: row.get(6).ok(),
        edited_image: row.get::<Vec<u8>>(7).ok(),
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl ProfileStore for LibSqlBackend {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_profile(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn upsert_profile(
        &self,
        user_id: &str,
        fields: &ProfileFields,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO user_profiles (user_id, name, state, craft_type, materials, years_experience,
                sales_channels, price_range, languages, brand_style, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
             ON CONFLICT (user_id) DO UPDATE SET
                name = ?2, state = ?3, craft_type = ?4, materials = ?5, years_experience = ?6,
                sales_channels = ?7, price_range = ?8, languages = ?9, brand_style = ?10,
                updated_at = ?11",
            params![
                user_id,
                opt_text(fields.get(ProfileField::Name)),
                opt_text(fields.get(ProfileField::State)),
                opt_text(fields.get(ProfileField::CraftType)),
                opt_text(fields.get(ProfileField::Materials)),
                opt_text(fields.get(ProfileField::YearsExperience)),
                opt_text(fields.get(ProfileField::SalesChannels)),
                opt_text(fields.get(ProfileField::PriceRange)),
                opt_text(fields.get(ProfileField::Languages)),
                opt_text(fields.get(ProfileField::BrandStyle)),
                now
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("upsert_profile: {e}")))?;

        debug!(user_id, "Profile saved");
        Ok(())
    }

    async fn set_backstory(&self, user_id: &str, backstory: &str) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let affected = conn
            .execute(
                "UPDATE user_profiles SET backstory = ?2, updated_at = ?3 WHERE user_id = ?1",
                params![user_id, backstory, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_backstory: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "user_profile".to_string(),
                id: user_id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_profile(&self, user_id: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM user_profiles WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_profile: {e}")))?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl ConversationLog for LibSqlBackend {
    async fn append_message(
        &self,
        user_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO conversations (user_id, message_type, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id, role.as_str(), content, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_message: {e}")))?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, message_type, content, timestamp FROM conversations
                 WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
                params![user_id, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_messages: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_messages: {e}")))?
        {
            let role: String = row.get(1).unwrap_or_default();
            let timestamp: String = row.get(3).unwrap_or_default();
            entries.push(ConversationEntry {
                user_id: row.get(0).unwrap_or_default(),
                role: MessageRole::parse(&role),
                content: row.get(2).unwrap_or_default(),
                timestamp: parse_datetime(&timestamp),
            });
        }
        Ok(entries)
    }

    async fn clear_messages(&self, user_id: &str) -> Result<u64, DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM conversations WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_messages: {e}")))
    }
}

#[async_trait]
impl MediaStore for LibSqlBackend {
    async fn insert_media(&self, record: &GeneratedMediaRecord) -> Result<Uuid, DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO user_generated_media (id, user_id, description, prompt_used, model_used,
                    original_image_path, edited_image_path, edited_image_blob, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id.to_string(),
                    record.user_id.as_str(),
                    opt_text(record.description.as_deref()),
                    record.prompt_used.as_str(),
                    opt_text(record.model_used.as_deref()),
                    opt_text(record.original_image_path.as_deref()),
                    opt_text(record.edited_image_path.as_deref()),
                    opt_blob(record.edited_image.as_deref()),
                    record.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_media: {e}")))?;

        debug!(user_id = %record.user_id, media_id = %record.id, "Media record inserted");
        Ok(record.id)
    }

    async fn list_media(&self, user_id: &str) -> Result<Vec<GeneratedMediaRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, description, prompt_used, model_used, original_image_path,
                    edited_image_path, edited_image_blob, created_at
                 FROM user_generated_media WHERE user_id = ?1
                 ORDER BY created_at DESC",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_media: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_media: {e}")))?
        {
            records.push(row_to_media(&row)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl CheckpointStore for LibSqlBackend {
    async fn load_checkpoint(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationState>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT state FROM checkpoints WHERE conversation_id = ?1",
                params![conversation_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_checkpoint: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("load_checkpoint: {e}")))?;
                let state = serde_json::from_str(&raw)
                    .map_err(|e| DatabaseError::Serialization(format!("checkpoint: {e}")))?;
                Ok(Some(state))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_checkpoint: {e}"))),
        }
    }

    async fn save_checkpoint(
        &self,
        conversation_id: &str,
        state: &ConversationState,
    ) -> Result<(), DatabaseError> {
        let raw = serde_json::to_string(state)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                "INSERT INTO checkpoints (conversation_id, user_id, state, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (conversation_id) DO UPDATE SET user_id = ?2, state = ?3, updated_at = ?4",
                params![conversation_id, state.user_id.as_str(), raw, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_checkpoint: {e}")))?;
        Ok(())
    }

    async fn delete_checkpoints_for_user(&self, user_id: &str) -> Result<u64, DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM checkpoints WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_checkpoints_for_user: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::ChatTurn;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn full_fields() -> ProfileFields {
        let mut fields = ProfileFields::default();
        fields.set(ProfileField::Name, "Asha");
        fields.set(ProfileField::State, "Odisha");
        fields.set(ProfileField::CraftType, "pottery");
        fields.set(ProfileField::Materials, "clay");
        fields.set(ProfileField::YearsExperience, "12");
        fields.set(ProfileField::SalesChannels, "both");
        fields.set(ProfileField::PriceRange, "Rs 200-500");
        fields.set(ProfileField::Languages, "Odia, Hindi");
        fields.set(ProfileField::BrandStyle, "earthy");
        fields
    }

    // ── Profile tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn upsert_then_get_returns_all_fields() {
        let db = test_db().await;
        let fields = full_fields();
        db.upsert_profile("u1", &fields).await.unwrap();

        let profile = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.user_id, "u1");
        assert_eq!(profile.fields, fields);
        assert!(profile.is_complete());
        assert!(profile.backstory.is_none());
    }

    #[tokio::test]
    async fn get_unknown_profile_is_none() {
        let db = test_db().await;
        assert!(db.get_profile("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_updates_in_place_and_keeps_backstory() {
        let db = test_db().await;
        db.upsert_profile("u1", &full_fields()).await.unwrap();
        db.set_backstory("u1", "A story.").await.unwrap();

        let mut changed = full_fields();
        changed.set(ProfileField::PriceRange, "premium");
        db.upsert_profile("u1", &changed).await.unwrap();

        let profile = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.fields.get(ProfileField::PriceRange), Some("premium"));
        assert_eq!(profile.backstory.as_deref(), Some("A story."));
    }

    #[tokio::test]
    async fn set_backstory_without_profile_is_not_found() {
        let db = test_db().await;
        let err = db.set_backstory("ghost", "text").await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_profile_reports_existence() {
        let db = test_db().await;
        db.upsert_profile("u1", &full_fields()).await.unwrap();
        assert!(db.delete_profile("u1").await.unwrap());
        assert!(!db.delete_profile("u1").await.unwrap());
        assert!(db.get_profile("u1").await.unwrap().is_none());
    }

    // ── Conversation log tests ──────────────────────────────────────

    #[tokio::test]
    async fn recent_messages_newest_first() {
        let db = test_db().await;
        db.append_message("u1", MessageRole::Human, "hi").await.unwrap();
        db.append_message("u1", MessageRole::Assistant, "welcome")
            .await
            .unwrap();
        db.append_message("u2", MessageRole::Human, "other").await.unwrap();

        let entries = db.recent_messages("u1", 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content, "welcome");
        assert_eq!(entries[0].role, MessageRole::Assistant);
        assert_eq!(entries[1].content, "hi");

        assert_eq!(db.clear_messages("u1").await.unwrap(), 2);
        assert!(db.recent_messages("u1", 10).await.unwrap().is_empty());
        assert_eq!(db.recent_messages("u2", 10).await.unwrap().len(), 1);
    }

    // ── Media tests ─────────────────────────────────────────────────

    #[tokio::test]
    async fn media_insert_and_list() {
        let db = test_db().await;
        let older = GeneratedMediaRecord {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            description: Some("A clay pot.".into()),
            prompt_used: "studio shot".into(),
            model_used: Some("image-model".into()),
            original_image_path: Some("uploads/a.png".into()),
            edited_image_path: Some("edited/a.png".into()),
            edited_image: Some(vec![1, 2, 3]),
            created_at: Utc::now() - chrono::Duration::minutes(5),
        };
        let newer = GeneratedMediaRecord {
            id: Uuid::new_v4(),
            description: None,
            model_used: None,
            edited_image_path: None,
            edited_image: None,
            created_at: Utc::now(),
            ..older.clone()
        };
        db.insert_media(&older).await.unwrap();
        db.insert_media(&newer).await.unwrap();

        let listed = db.list_media("u1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id);
        assert!(listed[0].edited_image.is_none());
        assert_eq!(listed[1].edited_image, Some(vec![1, 2, 3]));
        assert_eq!(listed[1].description.as_deref(), Some("A clay pot."));
        assert!(db.list_media("u2").await.unwrap().is_empty());
    }

    // ── Checkpoint tests ────────────────────────────────────────────

    #[tokio::test]
    async fn checkpoint_round_trip_and_delete_by_user() {
        let db = test_db().await;
        let mut state = ConversationState::new("u1");
        state.messages.push(ChatTurn::human("hi"));
        state.user_profile_data.set(ProfileField::Name, "Asha");

        db.save_checkpoint("conv-1", &state).await.unwrap();
        db.save_checkpoint("conv-2", &state).await.unwrap();
        db.save_checkpoint("conv-3", &ConversationState::new("u2"))
            .await
            .unwrap();

        let loaded = db.load_checkpoint("conv-1").await.unwrap().unwrap();
        assert_eq!(loaded, state);

        assert_eq!(db.delete_checkpoints_for_user("u1").await.unwrap(), 2);
        assert!(db.load_checkpoint("conv-1").await.unwrap().is_none());
        assert!(db.load_checkpoint("conv-3").await.unwrap().is_some());
    }
}
