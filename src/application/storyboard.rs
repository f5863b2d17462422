use super::outputs::Download;
use super::tracker::{JobTracker, JobView};
use crate::domain::errors::JobError;
use crate::domain::jobs::{GenerationParams, ImageSource, JobId};
use crate::domain::operation::OperationName;
use crate::ports::generation::GenerationBackend;
use crate::ports::resources::{ResourceId, ResourceStore};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryboardSettings {
    pub model: String,
    /// Applied to scenes added without their own ratio.
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, Default)]
pub struct SceneDraft {
    pub prompt: String,
    pub image: Option<ImageSource>,
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SceneUpdate {
    pub prompt: Option<String>,
    pub image: Option<ImageSource>,
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoryboardSummary {
    pub total: usize,
    pub completed: usize,
    pub generating: usize,
}

/// Ordered collection of scene jobs, each generated from an image and a prompt.
pub struct Storyboard<B, S> {
    jobs: JobTracker<B, S>,
    aspect_ratio: Arc<Mutex<String>>,
}

impl<B, S> Clone for Storyboard<B, S> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            aspect_ratio: self.aspect_ratio.clone(),
        }
    }
}

impl<B, S> Storyboard<B, S>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    pub fn new(jobs: JobTracker<B, S>, aspect_ratio: impl Into<String>) -> Self {
        Self {
            jobs,
            aspect_ratio: Arc::new(Mutex::new(aspect_ratio.into())),
        }
    }

    pub fn settings(&self) -> StoryboardSettings {
        StoryboardSettings {
            model: self.jobs.default_model(),
            aspect_ratio: self.aspect_ratio.lock().clone(),
        }
    }

    pub fn set_model(&self, model: impl Into<String>) {
        self.jobs.set_default_model(model);
    }

    pub fn set_aspect_ratio(&self, aspect_ratio: impl Into<String>) {
        *self.aspect_ratio.lock() = aspect_ratio.into();
    }

    pub fn add_scene(&self, draft: SceneDraft) -> JobView {
        let aspect_ratio = draft
            .aspect_ratio
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.aspect_ratio.lock().clone());
        self.jobs.insert(GenerationParams {
            prompt: draft.prompt,
            aspect_ratio,
            image: draft.image,
            image_required: true,
            ..Default::default()
        })
    }

    pub fn update_scene(&self, id: JobId, update: SceneUpdate) -> Result<JobView, JobError> {
        self.jobs.update_params(id, |params| {
            if let Some(prompt) = update.prompt {
                params.prompt = prompt;
            }
            if let Some(image) = update.image {
                params.image = Some(image);
            }
            if let Some(aspect_ratio) = update.aspect_ratio {
                params.aspect_ratio = aspect_ratio;
            }
        })
    }

    pub async fn generate(&self, id: JobId) -> Result<OperationName, JobError> {
        self.jobs.generate(id).await
    }

    /// Return a scene to `idle` so it can be generated again. Its prompt and
    /// image are kept; its poller stops and its assets are released.
    pub fn reset_scene(&self, id: JobId) -> Result<JobView, JobError> {
        self.jobs.reset_job(id)
    }

    pub fn remove(&self, id: JobId) -> Result<(), JobError> {
        self.jobs.remove(id)
    }

    pub fn reorder(&self, from: usize, to: usize) -> Result<(), JobError> {
        self.jobs.reorder(from, to)
    }

    /// Drop every scene, releasing all of their assets.
    pub fn reset_all(&self) -> usize {
        self.jobs.clear()
    }

    pub fn attach_trim(&self, id: JobId, bytes: Bytes) -> Result<ResourceId, JobError> {
        self.jobs.attach_derived(id, bytes)
    }

    pub fn clear_trim(&self, id: JobId) -> Result<JobView, JobError> {
        self.jobs.clear_derived(id)
    }

    /// The scene's asset, named after its current position.
    pub fn download(&self, id: JobId) -> Result<Download, JobError> {
        let position = self.jobs.position(id).ok_or(JobError::NotFound(id))?;
        self.jobs.download(id, &format!("scene_{}", position + 1))
    }

    pub fn scene(&self, id: JobId) -> Option<JobView> {
        self.jobs.view(id)
    }

    pub fn scenes(&self) -> Vec<JobView> {
        self.jobs.views()
    }

    pub fn summary(&self) -> StoryboardSummary {
        let scenes = self.jobs.views();
        StoryboardSummary {
            total: scenes.len(),
            completed: scenes.iter().filter(|s| s.display.is_some()).count(),
            generating: scenes.iter().filter(|s| s.is_generating).count(),
        }
    }

    pub fn tracker(&self) -> &JobTracker<B, S> {
        &self.jobs
    }
}
