//! Image generation capability and its Gemini REST implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ImageConfig;
use crate::error::ImageError;

/// An image handed to the model for editing.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// An image produced by a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
    /// Model that produced it.
    pub model: String,
}

impl GeneratedImage {
    /// File extension matching the mime type.
    pub fn extension(&self) -> &'static str {
        extension_for(&self.mime)
    }
}

pub fn extension_for(mime: &str) -> &'static str {
    if mime.contains("jpeg") || mime.contains("jpg") {
        "jpg"
    } else if mime.contains("webp") {
        "webp"
    } else {
        "png"
    }
}

/// Prompt (plus optional source image) in, image bytes out.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        source: Option<&SourceImage>,
    ) -> Result<GeneratedImage, ImageError>;

    /// Whether calling `generate` can succeed at all.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Gemini `generateContent` with a list of models tried in order.
pub struct GeminiImageEditor {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    models: Vec<String>,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    response_modalities: [&'static str; 2],
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(rename = "inlineData", alias = "inline_data")]
    inline_data: Option<InlineData>,
}

impl GeminiImageEditor {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: SecretString,
        models: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
            models,
            timeout,
        }
    }

    async fn call_model(
        &self,
        model: &str,
        body: &GenerateContentRequest,
    ) -> Result<GeneratedImage, ImageError> {
        let url = format!(
            "{}/models/{model}:generateContent",
            self.endpoint.trim_end_matches('/')
        );

        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| ImageError::RequestFailed {
                model: model.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ImageError::RequestFailed {
                model: model.to_string(),
                reason: format!("HTTP {status}: {err}"),
            });
        }

        let parsed: GenerateContentResponse =
            resp.json().await.map_err(|e| ImageError::RequestFailed {
                model: model.to_string(),
                reason: format!("invalid response: {e}"),
            })?;

        let inline = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.inline_data.filter(|d| !d.data.is_empty()))
            .ok_or_else(|| ImageError::NoImage {
                model: model.to_string(),
            })?;

        let bytes = BASE64
            .decode(inline.data.as_bytes())
            .map_err(|e| ImageError::RequestFailed {
                model: model.to_string(),
                reason: format!("image data is not base64: {e}"),
            })?;

        Ok(GeneratedImage {
            bytes,
            mime: inline.mime_type,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ImageGenerator for GeminiImageEditor {
    async fn generate(
        &self,
        prompt: &str,
        source: Option<&SourceImage>,
    ) -> Result<GeneratedImage, ImageError> {
        let mut parts = vec![Part::Text {
            text: prompt.to_string(),
        }];
        if let Some(source) = source {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: source.mime.clone(),
                    data: BASE64.encode(&source.bytes),
                },
            });
        }
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: 1.0,
                top_p: 0.95,
                response_modalities: ["TEXT", "IMAGE"],
            },
        };

        let mut last_error = String::from("no image models configured");
        for model in &self.models {
            match self.call_model(model, &body).await {
                Ok(image) => {
                    debug!(model = %model, bytes = image.bytes.len(), "Image generated");
                    return Ok(image);
                }
                Err(e) => {
                    warn!(model = %model, "Image model failed, trying next: {}", e);
                    last_error = e.to_string();
                }
            }
        }
        Err(ImageError::AllModelsFailed(last_error))
    }
}

/// Stand-in used when no image API key is configured.
pub struct DisabledImageGenerator;

#[async_trait]
impl ImageGenerator for DisabledImageGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _source: Option<&SourceImage>,
    ) -> Result<GeneratedImage, ImageError> {
        Err(ImageError::NotConfigured)
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Build the image generator for the given configuration.
pub fn create_image_generator(config: &ImageConfig) -> Arc<dyn ImageGenerator> {
    match &config.api_key {
        Some(key) => {
            tracing::info!(models = ?config.models, "Image generation enabled");
            Arc::new(GeminiImageEditor::new(
                config.endpoint.clone(),
                key.clone(),
                config.models.clone(),
                config.timeout,
            ))
        }
        None => {
            tracing::warn!("ARTISAN_IMAGE_API_KEY not set, image generation disabled");
            Arc::new(DisabledImageGenerator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::{Json, Router, routing::post};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// `broken` answers 500, `textonly` answers without an image, anything
    /// else returns the bytes "edited".
    fn fake_gemini() -> Router {
        Router::new().route(
            "/models/{action}",
            post(
                |Path(action): Path<String>, Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(body["contents"][0]["parts"][0]["text"], "make it shine");
                    if action.starts_with("broken") {
                        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
                    }
                    if action.starts_with("textonly") {
                        return Json(serde_json::json!({
                            "candidates": [{"content": {"parts": [{"text": "sorry"}]}}]
                        }))
                        .into_response();
                    }
                    Json(serde_json::json!({
                        "candidates": [{"content": {"parts": [
                            {"text": "here you go"},
                            {"inlineData": {"mimeType": "image/jpeg", "data": BASE64.encode(b"edited")}}
                        ]}}]
                    }))
                    .into_response()
                },
            ),
        )
    }

    fn editor(endpoint: String, models: &[&str]) -> GeminiImageEditor {
        GeminiImageEditor::new(
            endpoint,
            SecretString::from("k"),
            models.iter().map(|m| m.to_string()).collect(),
            Duration::from_secs(5),
        )
    }

    fn source() -> SourceImage {
        SourceImage {
            bytes: b"raw".to_vec(),
            mime: "image/png".into(),
        }
    }

    #[tokio::test]
    async fn falls_back_to_next_model() {
        let url = serve(fake_gemini()).await;
        let editor = editor(url, &["broken-model", "textonly-model", "good-model"]);

        let image = editor.generate("make it shine", Some(&source())).await.unwrap();
        assert_eq!(image.bytes, b"edited");
        assert_eq!(image.model, "good-model");
        assert_eq!(image.extension(), "jpg");
    }

    #[tokio::test]
    async fn all_models_failing_is_reported() {
        let url = serve(fake_gemini()).await;
        let editor = editor(url, &["broken-model", "textonly-model"]);

        let err = editor.generate("make it shine", None).await.unwrap_err();
        assert!(matches!(err, ImageError::AllModelsFailed(_)));
        assert!(err.to_string().contains("textonly-model"));
    }

    #[tokio::test]
    async fn disabled_generator_is_not_configured() {
        let generator = create_image_generator(&ImageConfig::default());
        assert!(!generator.is_configured());
        assert!(matches!(
            generator.generate("p", None).await,
            Err(ImageError::NotConfigured)
        ));
    }

    #[test]
    fn extensions_follow_mime() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/webp"), "webp");
        assert_eq!(extension_for("application/octet-stream"), "png");
    }
}
