//! Multipart bodies sent by the UI.

use crate::domain::jobs::{ImageSource, DEFAULT_IMAGE_MIME};
use axum::extract::Multipart;
use axum::http::StatusCode;

use super::ApiResult;

/// Fields shared by scene creation, scene edits and image uploads.
#[derive(Debug, Default)]
pub struct PromptForm {
    pub prompt: Option<String>,
    pub aspect_ratio: Option<String>,
    pub image: Option<ImageSource>,
    /// Every `imageFiles` part, in upload order.
    pub images: Vec<ImageSource>,
}

pub async fn read(mut multipart: Multipart) -> ApiResult<PromptForm> {
    let mut form = PromptForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "imageFile" => {
                if let Some(image) = upload(field).await? {
                    form.image = Some(image);
                }
            }
            "imageFiles" => form.images.extend(upload(field).await?),
            "imageDataUrl" => {
                let data_url = text(field).await?;
                let image = ImageSource::from_data_url(&data_url)
                    .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
                form.image = Some(image);
            }
            "prompt" => form.prompt = Some(text(field).await?),
            "aspectRatio" => form.aspect_ratio = Some(text(field).await?),
            _ => continue,
        }
    }

    Ok(form)
}

async fn upload(field: axum::extract::multipart::Field<'_>) -> ApiResult<Option<ImageSource>> {
    let file_name = field.file_name().unwrap_or("image").to_string();
    let mime = field
        .content_type()
        .unwrap_or(DEFAULT_IMAGE_MIME)
        .to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    // Browsers send an empty part when no file was picked
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(ImageSource::Upload {
        bytes,
        file_name,
        mime,
    }))
}

async fn text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}
