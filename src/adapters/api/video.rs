use super::{attachment, form, reject, ApiResult};
use crate::application::single::{ImageToolsView, VideoRequest};
use crate::application::studio::Studio;
use crate::application::tracker::JobView;
use crate::domain::errors::{JobError, ValidationError};
use crate::ports::generation::GenerationBackend;
use crate::ports::resources::{ResourceId, ResourceStore};
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct VideoPage {
    pub job: Option<JobView>,
    pub images: ImageToolsView,
}

#[derive(Debug, Deserialize)]
pub struct ImagePrompt {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub preview: ResourceId,
}

fn page<B, S>(studio: &Studio<B, S>) -> VideoPage
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    VideoPage {
        job: studio.single.current(),
        images: studio.single.images(),
    }
}

pub async fn show<B, S>(State(studio): State<Studio<B, S>>) -> Json<VideoPage>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    Json(page(&studio))
}

pub async fn generate_image<B, S>(
    State(studio): State<Studio<B, S>>,
    Json(request): Json<ImagePrompt>,
) -> ApiResult<Json<Preview>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    let preview = studio
        .single
        .generate_image(&request.prompt)
        .await
        .map_err(reject)?;
    Ok(Json(Preview { preview }))
}

pub async fn upload_image<B, S>(
    State(studio): State<Studio<B, S>>,
    multipart: Multipart,
) -> ApiResult<Json<VideoPage>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    let form = form::read(multipart).await?;
    let image = form
        .image
        .ok_or_else(|| reject(ValidationError::MissingImage.into()))?;
    studio.single.pick_image(image);
    Ok(Json(page(&studio)))
}

pub async fn generate<B, S>(
    State(studio): State<Studio<B, S>>,
    Json(request): Json<VideoRequest>,
) -> ApiResult<Json<JobView>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio.single.start(request).await.map(Json).map_err(reject)
}

pub async fn attach_trim<B, S>(
    State(studio): State<Studio<B, S>>,
    body: Bytes,
) -> ApiResult<Json<JobView>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio.single.attach_trim(body).map_err(reject)?;
    studio
        .single
        .current()
        .map(Json)
        .ok_or_else(|| reject(JobError::NoJob))
}

pub async fn clear_trim<B, S>(State(studio): State<Studio<B, S>>) -> ApiResult<Json<JobView>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio.single.clear_trim().map(Json).map_err(reject)
}

pub async fn download<B, S>(State(studio): State<Studio<B, S>>) -> ApiResult<Response>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio.single.download().map(attachment).map_err(reject)
}

pub async fn reset<B, S>(State(studio): State<Studio<B, S>>) -> Json<VideoPage>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio.single.reset();
    Json(page(&studio))
}
