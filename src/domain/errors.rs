//! Error taxonomy shared by the application services and adapters.

use thiserror::Error;

use super::jobs::{JobId, JobStatus};

/// Rejected locally, before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("an image source is required for image-conditioned generation")]
    MissingImage,
    #[error("image payload is not a valid base64 data url")]
    MalformedImage,
}

/// Failures reported by the generation backend port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(String),
    #[error("backend responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend response did not carry an operation name")]
    MissingOperation,
    #[error("backend response could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("submission failed: {0}")]
    Submission(#[source] BackendError),
    #[error("image generation failed: {0}")]
    ImageGeneration(#[source] BackendError),
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {id} is busy ({status:?})")]
    Busy { id: JobId, status: JobStatus },
    #[error("job {0} already succeeded; reset it before generating again")]
    AlreadySucceeded(JobId),
    #[error("job {0} has no result yet")]
    NoResult(JobId),
    #[error("job {0} was reset or removed while submitting")]
    Superseded(JobId),
    #[error("cannot move position {from} to {to} in a collection of {len}")]
    OutOfRange { from: usize, to: usize, len: usize },
    #[error("no job has been started")]
    NoJob,
    #[error("a photo edit is already in progress")]
    EditInProgress,
    #[error("photo session was reset while editing")]
    EditDiscarded,
    #[error("photo edit {0} does not exist")]
    NoTurn(usize),
}
