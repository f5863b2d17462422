use crate::domain::errors::BackendError;
use crate::domain::jobs::{ImageEditRequest, SubmitRequest};
use crate::domain::operation::{GeneratedImage, OperationName, OperationStatus};
use async_trait::async_trait;
use bytes::Bytes;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Start a video generation. Issues exactly one request and never retries.
    async fn submit(&self, request: &SubmitRequest) -> Result<OperationName, BackendError>;

    /// Query the state of a long-running operation.
    async fn poll(&self, operation: &str) -> Result<OperationStatus, BackendError>;

    /// Download the asset behind a result URI.
    async fn fetch(&self, uri: &str) -> Result<Bytes, BackendError>;

    /// Produce a still image from a prompt, used as a conditioning image.
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, BackendError>;

    /// Produce an edited image from a prompt, reference images and earlier edits.
    async fn edit_image(&self, request: &ImageEditRequest) -> Result<GeneratedImage, BackendError>;
}
