//! HTTP client for the generation proxy.

use crate::domain::errors::BackendError;
use crate::domain::jobs::{ImageEditRequest, ImageSource, SubmitRequest};
use crate::domain::operation::{
    GeneratedImage, GeneratedImageResponse, OperationName, OperationStatus,
};
use crate::ports::generation::GenerationBackend;
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Serialize)]
struct OperationQuery<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct DownloadQuery<'a> {
    uri: &'a str,
}

#[derive(Serialize)]
struct ImageQuery<'a> {
    prompt: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("story-composer/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Build the multipart body of a submit call.
fn submit_form(request: &SubmitRequest) -> Result<Form, BackendError> {
    let mut form = Form::new()
        .text("prompt", request.prompt.clone())
        .text("model", request.model.clone());
    if let Some(negative_prompt) = &request.negative_prompt {
        form = form.text("negativePrompt", negative_prompt.clone());
    }
    if let Some(aspect_ratio) = &request.aspect_ratio {
        form = form.text("aspectRatio", aspect_ratio.clone());
    }

    match &request.image {
        Some(ImageSource::Upload {
            bytes,
            file_name,
            mime,
        }) => {
            let part = Part::bytes(bytes.to_vec())
                .file_name(file_name.clone())
                .mime_str(mime)
                .map_err(|e| BackendError::Transport(e.to_string()))?;
            form = form.part("imageFile", part);
        }
        Some(ImageSource::Generated { bytes, mime }) => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            form = form
                .text("imageBase64", encoded)
                .text("imageMimeType", mime.clone());
        }
        None => {}
    }
    Ok(form)
}

/// Build the multipart body of a photo edit call.
fn edit_form(request: &ImageEditRequest) -> Result<Form, BackendError> {
    let mut form = Form::new()
        .text("prompt", request.prompt.clone())
        .text("model", request.model.clone());

    for (n, reference) in request.references.iter().enumerate() {
        let file_name = match reference {
            ImageSource::Upload { file_name, .. } => file_name.clone(),
            ImageSource::Generated { .. } => format!("reference-{}", n + 1),
        };
        let part = Part::bytes(reference.bytes().to_vec())
            .file_name(file_name)
            .mime_str(reference.mime())
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        form = form.part("imageFiles", part);
    }
    for earlier in &request.context {
        let encoded = base64::engine::general_purpose::STANDARD.encode(earlier.bytes());
        form = form
            .text("imageBase64", encoded)
            .text("imageMimeType", earlier.mime().to_string());
    }
    Ok(form)
}

fn require_image(generated: GeneratedImageResponse) -> Result<GeneratedImage, BackendError> {
    generated
        .image
        .filter(|image| !image.image_bytes.is_empty())
        .ok_or_else(|| BackendError::Decode("response carried no image".to_string()))
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn submit(&self, request: &SubmitRequest) -> Result<OperationName, BackendError> {
        let form = submit_form(request)?;
        let response = self
            .client
            .post(self.url("/api/veo/generate"))
            .multipart(form)
            .send()
            .await?;
        let response = check(response).await?;

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|_| BackendError::MissingOperation)?;
        match submitted.name {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(BackendError::MissingOperation),
        }
    }

    async fn poll(&self, operation: &str) -> Result<OperationStatus, BackendError> {
        debug!("Checking operation {}", operation);
        let response = self
            .client
            .post(self.url("/api/veo/operation"))
            .json(&OperationQuery { name: operation })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn fetch(&self, uri: &str) -> Result<Bytes, BackendError> {
        let response = self
            .client
            .post(self.url("/api/veo/download"))
            .json(&DownloadQuery { uri })
            .send()
            .await?;
        Ok(check(response).await?.bytes().await?)
    }

    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, BackendError> {
        let response = self
            .client
            .post(self.url("/api/imagen/generate"))
            .json(&ImageQuery { prompt })
            .send()
            .await?;
        let generated: GeneratedImageResponse = check(response).await?.json().await?;
        require_image(generated)
    }

    async fn edit_image(&self, request: &ImageEditRequest) -> Result<GeneratedImage, BackendError> {
        debug!(
            "Editing image with {} references and {} earlier results",
            request.references.len(),
            request.context.len()
        );
        let form = edit_form(request)?;
        let response = self
            .client
            .post(self.url("/api/photo-editor/generate"))
            .multipart(form)
            .send()
            .await?;
        let generated: GeneratedImageResponse = check(response).await?.json().await?;
        require_image(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalised() {
        let backend = HttpBackend::new("http://proxy:8787/", Duration::from_secs(1)).unwrap();
        assert_eq!(backend.url("/api/veo/operation"), "http://proxy:8787/api/veo/operation");
    }

    #[test]
    fn test_submit_form_rejects_invalid_upload_mime() {
        let request = SubmitRequest {
            prompt: "a whale breaching".to_string(),
            model: "veo-3.0-generate-preview".to_string(),
            negative_prompt: None,
            aspect_ratio: None,
            image: Some(ImageSource::Upload {
                bytes: Bytes::from_static(b"jpeg"),
                file_name: "whale.jpg".to_string(),
                mime: "not a mime".to_string(),
            }),
        };
        assert!(matches!(
            submit_form(&request),
            Err(BackendError::Transport(_))
        ));
    }

    #[test]
    fn test_edit_form_rejects_invalid_reference_mime() {
        let request = ImageEditRequest {
            prompt: "make the sky purple".to_string(),
            model: "gemini-2.5-flash-image-preview".to_string(),
            references: vec![ImageSource::Upload {
                bytes: Bytes::from_static(b"png"),
                file_name: "sky.png".to_string(),
                mime: "no mime here".to_string(),
            }],
            context: Vec::new(),
        };
        assert!(matches!(edit_form(&request), Err(BackendError::Transport(_))));
    }

    #[test]
    fn test_edit_response_requires_image_bytes() {
        let empty: GeneratedImageResponse =
            serde_json::from_str(r#"{"image":{"imageBytes":"","mimeType":"image/png"}}"#).unwrap();
        assert!(matches!(require_image(empty), Err(BackendError::Decode(_))));

        let image: GeneratedImageResponse =
            serde_json::from_str(r#"{"image":{"imageBytes":"aGVsbG8=","mimeType":"image/png"}}"#)
                .unwrap();
        assert_eq!(require_image(image).unwrap().mime_type, "image/png");
    }

    #[test]
    fn test_submit_response_without_name() {
        let parsed: SubmitResponse = serde_json::from_str(r#"{"error":"quota"}"#).unwrap();
        assert!(parsed.name.is_none());
        let parsed: SubmitResponse =
            serde_json::from_str(r#"{"name":"operations/abc"}"#).unwrap();
        assert_eq!(parsed.name.as_deref(), Some("operations/abc"));
    }
}
