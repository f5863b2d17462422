use super::{attachment, form, reject, ApiResult};
use crate::application::photo::{PhotoEditorView, TurnView};
use crate::application::studio::Studio;
use crate::domain::errors::ValidationError;
use crate::ports::generation::GenerationBackend;
use crate::ports::resources::ResourceStore;
use axum::{
    extract::{Multipart, Path, State},
    response::Response,
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct EditPrompt {
    pub prompt: String,
}

pub async fn show<B, S>(State(studio): State<Studio<B, S>>) -> Json<PhotoEditorView>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    Json(studio.photo.view())
}

/// Accepts any number of `imageFiles` parts.
pub async fn add_references<B, S>(
    State(studio): State<Studio<B, S>>,
    multipart: Multipart,
) -> ApiResult<Json<PhotoEditorView>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    let form = form::read(multipart).await?;
    let images: Vec<_> = form.images.into_iter().chain(form.image).collect();
    if images.is_empty() {
        return Err(reject(ValidationError::MissingImage.into()));
    }
    studio.photo.add_references(images);
    Ok(Json(studio.photo.view()))
}

pub async fn clear_references<B, S>(State(studio): State<Studio<B, S>>) -> Json<PhotoEditorView>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio.photo.clear_references();
    Json(studio.photo.view())
}

pub async fn edit<B, S>(
    State(studio): State<Studio<B, S>>,
    Json(request): Json<EditPrompt>,
) -> ApiResult<Json<TurnView>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio
        .photo
        .edit(&request.prompt)
        .await
        .map(Json)
        .map_err(reject)
}

pub async fn download<B, S>(
    State(studio): State<Studio<B, S>>,
    Path(index): Path<usize>,
) -> ApiResult<Response>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio.photo.download(index).map(attachment).map_err(reject)
}

pub async fn reset<B, S>(State(studio): State<Studio<B, S>>) -> Json<PhotoEditorView>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio.photo.reset();
    Json(studio.photo.view())
}
