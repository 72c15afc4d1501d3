//! Image editing, the media library and illustrated storybooks.

pub mod image;
pub mod storybook;
pub mod studio;

pub use image::{
    DisabledImageGenerator, GeminiImageEditor, GeneratedImage, ImageGenerator, SourceImage,
    create_image_generator,
};
pub use storybook::{StoryInputs, StoryPage, StorySection, Storybook, StorybookGenerator};
pub use studio::{ImageEditRequest, ImageEditResult, ImageStudio, MediaItem};
