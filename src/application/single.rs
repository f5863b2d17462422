//! Single video slot: one job at a time, optionally conditioned on an image
//! that is either uploaded or produced by the image model.

use super::outputs::Download;
use super::tracker::{JobTracker, JobView};
use crate::domain::errors::{BackendError, JobError, ValidationError};
use crate::domain::jobs::{GenerationParams, ImageSource, JobId};
use crate::ports::generation::GenerationBackend;
use crate::ports::resources::{OwnedHandle, ResourceId, ResourceStore};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub const VIDEO_FILE_STEM: &str = "veo3_video";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Condition the video on the picked or generated image.
    #[serde(default)]
    pub use_image: bool,
}

#[derive(Debug, Default)]
struct ImageTools {
    upload: Option<ImageSource>,
    generated: Option<(ImageSource, OwnedHandle)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageToolsView {
    pub has_upload: bool,
    pub generated_preview: Option<ResourceId>,
}

pub struct SingleVideo<B, S> {
    jobs: JobTracker<B, S>,
    aspect_ratio: String,
    images: Arc<Mutex<ImageTools>>,
}

impl<B, S> Clone for SingleVideo<B, S> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            aspect_ratio: self.aspect_ratio.clone(),
            images: self.images.clone(),
        }
    }
}

impl<B, S> SingleVideo<B, S>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    pub fn new(jobs: JobTracker<B, S>, aspect_ratio: impl Into<String>) -> Self {
        Self {
            jobs,
            aspect_ratio: aspect_ratio.into(),
            images: Arc::new(Mutex::new(ImageTools::default())),
        }
    }

    pub fn tracker(&self) -> &JobTracker<B, S> {
        &self.jobs
    }

    pub fn current(&self) -> Option<JobView> {
        self.jobs.views().into_iter().next()
    }

    fn current_id(&self) -> Result<JobId, JobError> {
        self.current().map(|job| job.id).ok_or(JobError::NoJob)
    }

    pub fn images(&self) -> ImageToolsView {
        let images = self.images.lock();
        ImageToolsView {
            has_upload: images.upload.is_some(),
            generated_preview: images.generated.as_ref().map(|(_, h)| h.id().clone()),
        }
    }

    /// Use a picked file as the conditioning image, discarding any generated one.
    pub fn pick_image(&self, image: ImageSource) {
        let mut images = self.images.lock();
        images.upload = Some(image);
        images.generated = None;
    }

    /// Ask the image model for a conditioning image and keep a preview of it.
    pub async fn generate_image(&self, prompt: &str) -> Result<ResourceId, JobError> {
        if prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt.into());
        }
        self.images.lock().generated = None;

        let image = self
            .jobs
            .backend()
            .generate_image(prompt)
            .await
            .map_err(JobError::ImageGeneration)?;
        let source = ImageSource::from_base64(&image.image_bytes, &image.mime_type).map_err(
            |e| JobError::ImageGeneration(BackendError::Decode(e.to_string())),
        )?;

        let store: Arc<dyn ResourceStore> = self.jobs.store().clone();
        let preview = OwnedHandle::create(store, source.bytes().clone(), source.mime());
        let preview_id = preview.id().clone();
        self.images.lock().generated = Some((source, preview));

        info!("Generated conditioning image {}", preview_id);
        Ok(preview_id)
    }

    fn image_source(&self) -> Option<ImageSource> {
        let images = self.images.lock();
        images
            .upload
            .clone()
            .or_else(|| images.generated.as_ref().map(|(source, _)| source.clone()))
    }

    /// Start a new video, replacing the previous one unless it is still generating.
    pub async fn start(&self, request: VideoRequest) -> Result<JobView, JobError> {
        let params = GenerationParams {
            prompt: request.prompt,
            negative_prompt: request.negative_prompt,
            aspect_ratio: request
                .aspect_ratio
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| self.aspect_ratio.clone()),
            model: request.model.filter(|m| !m.is_empty()),
            image: if request.use_image {
                self.image_source()
            } else {
                None
            },
            image_required: request.use_image,
        };

        let id = self.jobs.replace_and_generate(params).await?;
        self.jobs.view(id).ok_or(JobError::Superseded(id))
    }

    pub fn attach_trim(&self, bytes: Bytes) -> Result<ResourceId, JobError> {
        self.jobs.attach_derived(self.current_id()?, bytes)
    }

    pub fn clear_trim(&self) -> Result<JobView, JobError> {
        self.jobs.clear_derived(self.current_id()?)
    }

    pub fn download(&self) -> Result<Download, JobError> {
        self.jobs.download(self.current_id()?, VIDEO_FILE_STEM)
    }

    /// Forget the current job and every image, releasing all assets.
    pub fn reset(&self) {
        self.jobs.clear();
        let mut images = self.images.lock();
        images.upload = None;
        images.generated = None;
    }
}
