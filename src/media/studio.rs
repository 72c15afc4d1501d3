//! Product photo editing and the per-user media library.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ImageError, Result, WorkflowError};
use crate::llm::{LlmProvider, complete_text};
use crate::profile::{ProfileField, ProfileFields};
use crate::store::{GeneratedMediaRecord, MediaStore, ProfileStore};

use super::image::{GeneratedImage, ImageGenerator, SourceImage, extension_for};

const DESCRIPTION_SYSTEM_PROMPT: &str =
    "You help Indian artisans describe product photos for catalogs and social media.";

/// An image edit request.
#[derive(Debug, Clone)]
pub struct ImageEditRequest {
    pub user_id: String,
    pub image: SourceImage,
    /// Original file name, used only to name the saved upload.
    pub filename: Option<String>,
    /// Edit instruction; synthesized from the profile when absent.
    pub prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImageEditResult {
    /// `None` if the media record could not be saved.
    pub record_id: Option<Uuid>,
    pub prompt_used: String,
    pub edited_image: Option<GeneratedImage>,
    pub uploaded_path: PathBuf,
    pub edited_path: Option<PathBuf>,
    pub description: Option<String>,
}

impl ImageEditResult {
    pub fn model_used(&self) -> Option<&str> {
        self.edited_image.as_ref().map(|i| i.model.as_str())
    }

    /// Human-readable status line.
    pub fn message(&self, model_configured: bool) -> &'static str {
        match (&self.edited_image, model_configured) {
            (Some(_), _) => "Image edit completed",
            (None, true) => "Image model did not return an edited image",
            (None, false) => {
                "Image edit requested, but image-generation model is not configured or available."
            }
        }
    }
}

/// A stored media record with its edited bytes resolved.
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub record: GeneratedMediaRecord,
    /// Bytes from the stored blob, or read back from the edited file.
    pub edited_image: Option<Vec<u8>>,
}

/// Default edit instruction built from what the profile says about the artisan.
pub fn default_edit_prompt(fields: &ProfileFields) -> String {
    let name = fields.get(ProfileField::Name).unwrap_or("the artisan");
    let craft = fields.get(ProfileField::CraftType).unwrap_or("handmade crafts");
    let style = fields
        .get(ProfileField::BrandStyle)
        .unwrap_or("warm, natural, earthy");
    let region = match fields.get(ProfileField::State) {
        Some(state) => format!(" from {state}."),
        None => ".".to_string(),
    };

    format!(
        "Edit/enhance this photo for {name}, a {craft} artisan{region} Keep the style {style}. \
Improve lighting and colors, keep it authentic, no text or watermarks. \
Do not change the main product in the image, just make it look better. \
Change or enhance the background so it matches the type of product and looks suitable for \
advertising without making it completely different. \
Make it suitable for an e-commerce website, like a product photo taken with a DSLR."
    )
}

/// Keep only characters that are safe in a file name.
fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_matches('.').to_string()
}

pub struct ImageStudio {
    llm: Arc<dyn LlmProvider>,
    images: Arc<dyn ImageGenerator>,
    profiles: Arc<dyn ProfileStore>,
    media: Arc<dyn MediaStore>,
    media_dir: PathBuf,
}

impl ImageStudio {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        images: Arc<dyn ImageGenerator>,
        profiles: Arc<dyn ProfileStore>,
        media: Arc<dyn MediaStore>,
        media_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            llm,
            images,
            profiles,
            media,
            media_dir: media_dir.into(),
        }
    }

    pub fn model_configured(&self) -> bool {
        self.images.is_configured()
    }

    /// Edit a product photo for a user.
    ///
    /// The upload is always saved and a media record is always attempted.
    /// Model and description failures degrade to `None` fields.
    pub async fn edit_image(&self, request: ImageEditRequest) -> Result<ImageEditResult> {
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(WorkflowError::InvalidIdentity("user_id is required".to_string()).into());
        }
        if request.image.bytes.is_empty() {
            return Err(WorkflowError::InvalidInput("image file is required".to_string()).into());
        }

        let fields = match self.profiles.get_profile(user_id).await {
            Ok(profile) => profile.map(|p| p.fields).unwrap_or_default(),
            Err(e) => {
                warn!(user_id, "Profile lookup failed, using generic prompt: {}", e);
                ProfileFields::default()
            }
        };

        let prompt = match request.prompt.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => default_edit_prompt(&fields),
        };

        let upload_name = match request.filename.as_deref().map(safe_file_name) {
            Some(name) if !name.is_empty() => format!("upload_{}_{name}", Uuid::new_v4().simple()),
            _ => format!(
                "upload_{}.{}",
                Uuid::new_v4().simple(),
                extension_for(&request.image.mime)
            ),
        };
        let uploaded_path = self
            .write_file("uploads", &upload_name, &request.image.bytes)
            .await?;

        let edited_image = if self.images.is_configured() {
            match self.images.generate(&prompt, Some(&request.image)).await {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!(user_id, "Image edit failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let edited_path = match &edited_image {
            Some(image) => {
                let name = format!("edited_{}.{}", Uuid::new_v4().simple(), image.extension());
                match self.write_file("edited", &name, &image.bytes).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!(user_id, "Failed to save edited image: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        let description = self.describe(&fields, &prompt).await;

        let record = GeneratedMediaRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            description: description.clone(),
            prompt_used: prompt.clone(),
            model_used: edited_image.as_ref().map(|i| i.model.clone()),
            original_image_path: Some(uploaded_path.display().to_string()),
            edited_image_path: edited_path.as_ref().map(|p| p.display().to_string()),
            edited_image: edited_image.as_ref().map(|i| i.bytes.clone()),
            created_at: Utc::now(),
        };
        let record_id = match self.media.insert_media(&record).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(user_id, "Failed to save media record: {}", e);
                None
            }
        };

        info!(
            user_id,
            edited = edited_image.is_some(),
            described = description.is_some(),
            "Image edit handled"
        );

        Ok(ImageEditResult {
            record_id,
            prompt_used: prompt,
            edited_image,
            uploaded_path,
            edited_path,
            description,
        })
    }

    /// Media of a user, newest first.
    pub async fn list_media(&self, user_id: &str) -> Result<Vec<MediaItem>> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(WorkflowError::InvalidIdentity("user_id is required".to_string()).into());
        }

        let records = self.media.list_media(user_id).await?;
        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let edited_image = match (&record.edited_image, &record.edited_image_path) {
                (Some(bytes), _) if !bytes.is_empty() => Some(bytes.clone()),
                (_, Some(path)) => match tokio::fs::read(path).await {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        debug!(path = %path, "Edited image not readable: {}", e);
                        None
                    }
                },
                _ => None,
            };
            items.push(MediaItem {
                record,
                edited_image,
            });
        }
        Ok(items)
    }

    async fn describe(&self, fields: &ProfileFields, prompt: &str) -> Option<String> {
        let request = format!(
            "\
Write a single-paragraph product description for an Indian artisan's photo, suitable for \
e-commerce and Instagram. Keep it short (35-60 words), warm and authentic. Mention craft, \
materials, region or style if helpful. No emojis.

User Profile: {profile}
Instruction used for the photo: {prompt}",
            profile = fields.to_json(),
        );

        match complete_text(self.llm.as_ref(), DESCRIPTION_SYSTEM_PROMPT, &request, 0.7, 200).await {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                warn!("Product description failed: {}", e);
                None
            }
        }
    }

    async fn write_file(&self, subdir: &str, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.media_dir.join(subdir);
        tokio::fs::create_dir_all(&dir).await.map_err(ImageError::Io)?;
        let path = dir.join(name);
        tokio::fs::write(&path, bytes).await.map_err(ImageError::Io)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Saved image file");
        Ok(path)
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::assistant::test_support::RecordingLlm;
    use crate::error::Error;
    use crate::media::image::DisabledImageGenerator;
    use crate::store::LibSqlBackend;

    /// Returns "edited-bytes" as PNG and records prompts.
    #[derive(Default)]
    struct FakeEditor {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ImageGenerator for FakeEditor {
        async fn generate(
            &self,
            prompt: &str,
            _source: Option<&SourceImage>,
        ) -> std::result::Result<GeneratedImage, ImageError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                return Err(ImageError::AllModelsFailed("down".into()));
            }
            Ok(GeneratedImage {
                bytes: b"edited-bytes".to_vec(),
                mime: "image/png".into(),
                model: "fake-image".into(),
            })
        }
    }

    fn request(prompt: Option<&str>) -> ImageEditRequest {
        ImageEditRequest {
            user_id: "u1".into(),
            image: SourceImage {
                bytes: b"raw-bytes".to_vec(),
                mime: "image/png".into(),
            },
            filename: Some("my pot.png".into()),
            prompt: prompt.map(str::to_string),
        }
    }

    async fn studio(
        llm: RecordingLlm,
        images: Arc<dyn ImageGenerator>,
        dir: &Path,
    ) -> (ImageStudio, Arc<LibSqlBackend>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let studio = ImageStudio::new(Arc::new(llm), images, db.clone(), db.clone(), dir);
        (studio, db)
    }

    #[test]
    fn default_prompt_uses_profile() {
        let mut fields = ProfileFields::default();
        fields.set(ProfileField::Name, "Asha");
        fields.set(ProfileField::CraftType, "pottery");
        fields.set(ProfileField::State, "Odisha");
        let prompt = default_edit_prompt(&fields);
        assert!(prompt.starts_with("Edit/enhance this photo for Asha, a pottery artisan from Odisha."));
        assert!(prompt.contains("Keep the style warm, natural, earthy."));

        let generic = default_edit_prompt(&ProfileFields::default());
        assert!(generic.contains("for the artisan, a handmade crafts artisan."));
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(safe_file_name("my pot.png"), "my_pot.png");
        assert_eq!(safe_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(safe_file_name(".."), "");
    }

    #[tokio::test]
    async fn edit_saves_files_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let editor = Arc::new(FakeEditor::default());
        let (studio, db) = studio(
            RecordingLlm::replying("A warm clay pot from Odisha."),
            editor.clone(),
            dir.path(),
        )
        .await;

        let result = studio.edit_image(request(None)).await.unwrap();

        assert!(result.prompt_used.starts_with("Edit/enhance this photo for the artisan"));
        assert_eq!(result.model_used(), Some("fake-image"));
        assert_eq!(result.description.as_deref(), Some("A warm clay pot from Odisha."));
        assert!(result.uploaded_path.starts_with(dir.path().join("uploads")));
        assert!(result.uploaded_path.to_string_lossy().ends_with("_my_pot.png"));
        assert_eq!(std::fs::read(&result.uploaded_path).unwrap(), b"raw-bytes");
        let edited = result.edited_path.clone().unwrap();
        assert_eq!(std::fs::read(&edited).unwrap(), b"edited-bytes");
        assert_eq!(result.message(true), "Image edit completed");

        let stored = db.list_media("u1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(Some(stored[0].id), result.record_id);
        assert_eq!(stored[0].model_used.as_deref(), Some("fake-image"));
    }

    #[tokio::test]
    async fn explicit_prompt_is_used_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let editor = Arc::new(FakeEditor::default());
        let (studio, _db) = studio(RecordingLlm::replying("desc"), editor.clone(), dir.path()).await;

        let result = studio.edit_image(request(Some(" white background "))).await.unwrap();
        assert_eq!(result.prompt_used, "white background");
        assert_eq!(editor.prompts.lock().unwrap()[0], "white background");
    }

    #[tokio::test]
    async fn unconfigured_model_still_records_upload() {
        let dir = tempfile::tempdir().unwrap();
        let (studio, db) = studio(
            RecordingLlm::failing(),
            Arc::new(DisabledImageGenerator),
            dir.path(),
        )
        .await;

        let result = studio.edit_image(request(None)).await.unwrap();

        assert!(result.edited_image.is_none());
        assert!(result.edited_path.is_none());
        assert!(result.description.is_none());
        assert!(result.record_id.is_some());
        assert!(result.message(studio.model_configured()).contains("not configured"));

        let items = studio.list_media("u1").await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].edited_image.is_none());
        assert!(db.list_media("u1").await.unwrap()[0].model_used.is_none());
    }

    #[tokio::test]
    async fn model_failure_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let editor = Arc::new(FakeEditor {
            fail: true,
            ..Default::default()
        });
        let (studio, _db) = studio(RecordingLlm::replying("desc"), editor, dir.path()).await;

        let result = studio.edit_image(request(None)).await.unwrap();
        assert!(result.edited_image.is_none());
        assert_eq!(result.description.as_deref(), Some("desc"));
        assert_eq!(
            result.message(true),
            "Image model did not return an edited image"
        );
    }

    #[tokio::test]
    async fn listing_reads_back_edited_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let (studio, _db) = studio(
            RecordingLlm::replying("desc"),
            Arc::new(FakeEditor::default()),
            dir.path(),
        )
        .await;
        studio.edit_image(request(None)).await.unwrap();

        let items = studio.list_media("u1").await.unwrap();
        assert_eq!(items[0].edited_image.as_deref(), Some(&b"edited-bytes"[..]));
        assert!(studio.list_media("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (studio, _db) = studio(
            RecordingLlm::replying("desc"),
            Arc::new(DisabledImageGenerator),
            dir.path(),
        )
        .await;

        let mut blank_user = request(None);
        blank_user.user_id = " ".into();
        assert!(matches!(
            studio.edit_image(blank_user).await,
            Err(Error::Workflow(WorkflowError::InvalidIdentity(_)))
        ));

        let mut empty_image = request(None);
        empty_image.image.bytes.clear();
        assert!(matches!(
            studio.edit_image(empty_image).await,
            Err(Error::Workflow(WorkflowError::InvalidInput(_)))
        ));

        assert!(matches!(
            studio.list_media("").await,
            Err(Error::Workflow(WorkflowError::InvalidIdentity(_)))
        ));
    }
}
