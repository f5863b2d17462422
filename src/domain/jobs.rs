use bytes::Bytes;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

use super::errors::ValidationError;

pub const DEFAULT_ASPECT_RATIO: &str = "16:9";
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Stable identifier of a job record, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Submitting,
    Polling,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_generating(self) -> bool {
        matches!(self, JobStatus::Submitting | JobStatus::Polling)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Whether a record may move from `self` to `next`.
    ///
    /// `Succeeded -> Idle` is the explicit per-record reset; every other edge
    /// is driven by submission and polling.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Idle, Submitting)
                | (Failed, Submitting)
                | (Submitting, Polling)
                | (Submitting, Idle)
                | (Polling, Succeeded)
                | (Polling, Failed)
                | (Succeeded, Idle)
                | (Failed, Idle)
        )
    }
}

/// Image used to condition a video generation.
#[derive(Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// A file picked by the user, sent to the backend as raw bytes.
    Upload {
        bytes: Bytes,
        file_name: String,
        mime: String,
    },
    /// An image produced by the image model, sent as base64 + mime.
    Generated { bytes: Bytes, mime: String },
}

impl ImageSource {
    pub fn mime(&self) -> &str {
        match self {
            ImageSource::Upload { mime, .. } | ImageSource::Generated { mime, .. } => mime,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        match self {
            ImageSource::Upload { bytes, .. } | ImageSource::Generated { bytes, .. } => bytes,
        }
    }

    /// Parses a `data:<mime>;base64,<payload>` URL into a generated image.
    pub fn from_data_url(data_url: &str) -> Result<Self, ValidationError> {
        static DATA_URL: OnceLock<Regex> = OnceLock::new();
        let re = DATA_URL.get_or_init(|| {
            Regex::new(r"^data:([^;,]*)(?:;[^,]*)?,(.*)$").expect("data url pattern is valid")
        });

        let caps = re
            .captures(data_url.trim())
            .ok_or(ValidationError::MalformedImage)?;
        let mime = match caps.get(1).map(|m| m.as_str()) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => DEFAULT_IMAGE_MIME.to_string(),
        };
        let payload = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        Self::from_base64(payload, &mime)
    }

    /// Decodes a base64 payload, as returned by the image model.
    pub fn from_base64(payload: &str, mime: &str) -> Result<Self, ValidationError> {
        use base64::Engine;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|_| ValidationError::MalformedImage)?;
        let mime = if mime.is_empty() { DEFAULT_IMAGE_MIME } else { mime };

        Ok(ImageSource::Generated {
            bytes: Bytes::from(bytes),
            mime: mime.to_string(),
        })
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Upload {
                bytes,
                file_name,
                mime,
            } => f
                .debug_struct("Upload")
                .field("file_name", file_name)
                .field("mime", mime)
                .field("len", &bytes.len())
                .finish(),
            ImageSource::Generated { bytes, mime } => f
                .debug_struct("Generated")
                .field("mime", mime)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

/// Creative parameters of one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationParams {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub aspect_ratio: String,
    /// Overrides the tracker's default model when set.
    pub model: Option<String>,
    pub image: Option<ImageSource>,
    pub image_required: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: None,
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            model: None,
            image: None,
            image_required: false,
        }
    }
}

impl GenerationParams {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        if self.image_required && self.image.is_none() {
            return Err(ValidationError::MissingImage);
        }
        Ok(())
    }

    /// Builds the backend request for these parameters.
    pub fn to_request(&self, default_model: &str) -> SubmitRequest {
        SubmitRequest {
            prompt: self.prompt.clone(),
            model: self
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            negative_prompt: self
                .negative_prompt
                .clone()
                .filter(|p| !p.trim().is_empty()),
            aspect_ratio: Some(self.aspect_ratio.clone()).filter(|r| !r.is_empty()),
            image: if self.image_required {
                self.image.clone()
            } else {
                None
            },
        }
    }
}

/// What the generation backend receives on submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub prompt: String,
    pub model: String,
    pub negative_prompt: Option<String>,
    pub aspect_ratio: Option<String>,
    pub image: Option<ImageSource>,
}

/// What the image model receives for one photo edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEditRequest {
    pub prompt: String,
    pub model: String,
    /// Images the user attached, sent as file parts.
    pub references: Vec<ImageSource>,
    /// Earlier edits, oldest first, sent inline as base64.
    pub context: Vec<ImageSource>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_prompt_is_rejected() {
        let params = GenerationParams {
            prompt: "   ".to_string(),
            ..Default::default()
        };
        assert_eq!(params.validate(), Err(ValidationError::EmptyPrompt));
    }

    #[test]
    fn test_image_mode_requires_an_image() {
        let mut params = GenerationParams {
            prompt: "a lighthouse at dusk".to_string(),
            image_required: true,
            ..Default::default()
        };
        assert_eq!(params.validate(), Err(ValidationError::MissingImage));

        params.image = Some(ImageSource::Generated {
            bytes: Bytes::from_static(b"png"),
            mime: "image/png".to_string(),
        });
        assert_eq!(params.validate(), Ok(()));
    }

    #[test]
    fn test_request_drops_image_when_not_required() {
        let params = GenerationParams {
            prompt: "waves".to_string(),
            negative_prompt: Some("  ".to_string()),
            image: Some(ImageSource::Generated {
                bytes: Bytes::from_static(b"png"),
                mime: "image/png".to_string(),
            }),
            ..Default::default()
        };
        let request = params.to_request("veo-3.0-generate-preview");
        assert_eq!(request.model, "veo-3.0-generate-preview");
        assert_eq!(request.negative_prompt, None);
        assert_eq!(request.aspect_ratio.as_deref(), Some("16:9"));
        assert!(request.image.is_none());
    }

    #[test]
    fn test_data_url_parsing() {
        let image = ImageSource::from_data_url("data:image/jpeg;base64,aGVsbG8=").unwrap();
        assert_eq!(image.mime(), "image/jpeg");
        assert_eq!(image.bytes().as_ref(), b"hello");

        let image = ImageSource::from_data_url("data:;base64,aGVsbG8=").unwrap();
        assert_eq!(image.mime(), DEFAULT_IMAGE_MIME);

        assert_eq!(
            ImageSource::from_data_url("not a data url"),
            Err(ValidationError::MalformedImage)
        );
        assert_eq!(
            ImageSource::from_data_url("data:image/png;base64,@@@"),
            Err(ValidationError::MalformedImage)
        );
    }

    #[test]
    fn test_status_edges() {
        use JobStatus::*;
        assert!(Idle.can_transition_to(Submitting));
        assert!(Submitting.can_transition_to(Idle));
        assert!(Polling.can_transition_to(Succeeded));
        assert!(!Idle.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Submitting));
        assert!(!Polling.can_transition_to(Submitting));
        assert!(Polling.is_generating());
        assert!(Failed.is_terminal());
    }

    #[test]
    fn test_job_id_round_trips_through_display() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
