//! HTTP transport: chat, profile, media, storybook and health endpoints.

mod ws;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::error::{Error, WorkflowError};
use crate::media::{ImageEditRequest, ImageStudio, SourceImage, StoryInputs, StorybookGenerator};
use crate::profile::ProfileFields;
use crate::workflow::{FALLBACK_RESPONSE, Intent, Orchestrator};

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub studio: Arc<ImageStudio>,
    pub storybook: Arc<StorybookGenerator>,
    /// Reported by `/health`.
    pub llm_model: String,
    pub search_enabled: bool,
}

/// Build the router with all routes and permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route(
            "/user/{user_id}/profile",
            get(get_profile).delete(delete_profile),
        )
        .route("/user/{user_id}/backstory", get(get_backstory))
        .route("/user/{user_id}/media", get(list_media))
        .route("/image/edit", post(edit_image))
        .route("/storybook", post(create_storybook))
        .route("/ws/{user_id}", get(ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

/// Error returned by handlers. Server-side details are logged, never sent.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Upstream(String),
    Internal(String),
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::InvalidIdentity(_) | WorkflowError::InvalidInput(_) => {
                Self::BadRequest(e.to_string())
            }
            WorkflowError::NotFound { .. } => Self::NotFound(e.to_string()),
            WorkflowError::Storage(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Workflow(e) => e.into(),
            Error::Llm(_) | Error::Image(_) | Error::Search(_) => Self::Upstream(e.to_string()),
            Error::Config(_) | Error::Database(_) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Upstream(m) => {
                error!(error = %m, "Upstream model failure");
                (StatusCode::BAD_GATEWAY, "Upstream model failure".to_string())
            }
            Self::Internal(m) => {
                error!(error = %m, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = |enabled: bool| if enabled { "operational" } else { "disabled" };
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "services": {
            "llm": state.llm_model,
            "welfare_search": status(state.search_enabled),
            "image_generation": status(state.studio.model_configured()),
            "store": "operational",
        }
    }))
}

// ── Chat ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: String,
    /// Conversation to continue. Defaults to the user id, so a client that
    /// only sends `user_id` keeps one conversation across calls.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: String,
    pub is_onboarding: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_profile: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backstory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let result = state
        .orchestrator
        .turn(
            Some(req.conversation_id.as_deref().unwrap_or(&req.user_id)),
            &req.user_id,
            &req.message,
        )
        .await?;

    let response = if result.response_text.trim().is_empty() {
        FALLBACK_RESPONSE.to_string()
    } else {
        result.response_text
    };

    Ok(Json(ChatResponse {
        response,
        conversation_id: result.conversation_id,
        is_onboarding: result.is_onboarding,
        onboarding_step: result.onboarding_step.map(|f| f.key().to_string()),
        user_profile: result.profile,
        backstory: result.backstory,
        intent: result.intent,
    }))
}

// ── Profiles ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user_id: String,
    #[serde(flatten)]
    pub fields: ProfileFields,
    pub backstory: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let profile = state.orchestrator.get_profile(&user_id).await?;
    Ok(Json(ProfileResponse {
        user_id: profile.user_id,
        fields: profile.fields,
        backstory: profile.backstory,
        created_at: profile.created_at.to_rfc3339(),
        updated_at: profile.updated_at.to_rfc3339(),
    }))
}

async fn get_backstory(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let backstory = state.orchestrator.get_backstory(&user_id).await?;
    Ok(Json(serde_json::json!({
        "user_id": user_id,
        "backstory": backstory,
    })))
}

async fn delete_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.delete_profile(&user_id).await?;
    info!(user_id = %user_id, "Profile deleted via API");
    Ok(Json(serde_json::json!({
        "message": format!("Profile for user {user_id} deleted successfully"),
    })))
}

// ── Media ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MediaItemResponse {
    pub id: String,
    pub user_id: String,
    pub description: Option<String>,
    pub prompt_used: String,
    pub model_used: Option<String>,
    pub original_image_path: Option<String>,
    pub edited_image_path: Option<String>,
    pub created_at: String,
    pub edited_image_base64: Option<String>,
}

async fn list_media(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let items: Vec<MediaItemResponse> = state
        .studio
        .list_media(&user_id)
        .await?
        .into_iter()
        .map(|item| MediaItemResponse {
            id: item.record.id.to_string(),
            user_id: item.record.user_id,
            description: item.record.description,
            prompt_used: item.record.prompt_used,
            model_used: item.record.model_used,
            original_image_path: item.record.original_image_path,
            edited_image_path: item.record.edited_image_path,
            created_at: item.record.created_at.to_rfc3339(),
            edited_image_base64: item.edited_image.map(|b| BASE64.encode(b)),
        })
        .collect();

    Ok(Json(serde_json::json!({
        "user_id": user_id,
        "count": items.len(),
        "items": items,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ImageEditBody {
    pub user_id: String,
    pub image_base64: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

async fn edit_image(
    State(state): State<AppState>,
    Json(body): Json<ImageEditBody>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = BASE64
        .decode(body.image_base64.trim().as_bytes())
        .map_err(|_| ApiError::BadRequest("image_base64 is not valid base64".to_string()))?;

    let result = state
        .studio
        .edit_image(ImageEditRequest {
            user_id: body.user_id,
            image: SourceImage {
                bytes,
                mime: body.mime_type.unwrap_or_else(|| "image/png".to_string()),
            },
            filename: body.filename,
            prompt: body.prompt,
        })
        .await?;

    Ok(Json(serde_json::json!({
        "message": result.message(state.studio.model_configured()),
        "record_id": result.record_id.map(|id| id.to_string()),
        "prompt_used": result.prompt_used,
        "image_base64": result.edited_image.as_ref().map(|i| BASE64.encode(&i.bytes)),
        "saved_uploaded_path": result.uploaded_path.display().to_string(),
        "saved_edited_path": result.edited_path.as_ref().map(|p| p.display().to_string()),
        "model_used": result.model_used(),
        "description": result.description,
    })))
}

// ── Storybook ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StorybookBody {
    pub user_id: String,
    #[serde(flatten)]
    pub inputs: StoryInputs,
}

async fn create_storybook(
    State(state): State<AppState>,
    Json(body): Json<StorybookBody>,
) -> Result<impl IntoResponse, ApiError> {
    let book = state.storybook.generate(&body.user_id, &body.inputs).await?;

    let pages: Vec<serde_json::Value> = book
        .pages
        .iter()
        .map(|p| {
            serde_json::json!({
                "page": p.page,
                "section": p.section,
                "story_text": p.story_text,
                "image_base64": p.image.as_ref().map(|i| BASE64.encode(&i.bytes)),
                "mime_type": p.image.as_ref().map(|i| i.mime.clone()),
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "user_id": book.user_id,
        "pages": pages,
    })))
}
