use super::{attachment, form, reject, ApiResult};
use crate::application::storyboard::{
    SceneDraft, SceneUpdate, StoryboardSettings, StoryboardSummary,
};
use crate::application::studio::Studio;
use crate::application::tracker::JobView;
use crate::domain::jobs::JobId;
use crate::ports::generation::GenerationBackend;
use crate::ports::resources::ResourceStore;
use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct StoryboardPage {
    pub settings: StoryboardSettings,
    pub summary: StoryboardSummary,
    pub scenes: Vec<JobView>,
}

#[derive(Debug, Deserialize)]
pub struct Reorder {
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub model: Option<String>,
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Removed {
    pub removed: usize,
}

fn page<B, S>(studio: &Studio<B, S>) -> StoryboardPage
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    StoryboardPage {
        settings: studio.storyboard.settings(),
        summary: studio.storyboard.summary(),
        scenes: studio.storyboard.scenes(),
    }
}

pub async fn show<B, S>(State(studio): State<Studio<B, S>>) -> Json<StoryboardPage>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    Json(page(&studio))
}

pub async fn add_scene<B, S>(
    State(studio): State<Studio<B, S>>,
    multipart: Multipart,
) -> ApiResult<Json<JobView>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    let form = form::read(multipart).await?;
    let scene = studio.storyboard.add_scene(SceneDraft {
        prompt: form.prompt.unwrap_or_default(),
        image: form.image,
        aspect_ratio: form.aspect_ratio,
    });
    Ok(Json(scene))
}

pub async fn update_scene<B, S>(
    State(studio): State<Studio<B, S>>,
    Path(id): Path<JobId>,
    multipart: Multipart,
) -> ApiResult<Json<JobView>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    let form = form::read(multipart).await?;
    let update = SceneUpdate {
        prompt: form.prompt,
        image: form.image,
        aspect_ratio: form.aspect_ratio,
    };
    studio
        .storyboard
        .update_scene(id, update)
        .map(Json)
        .map_err(reject)
}

pub async fn remove_scene<B, S>(
    State(studio): State<Studio<B, S>>,
    Path(id): Path<JobId>,
) -> ApiResult<StatusCode>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio.storyboard.remove(id).map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn generate_scene<B, S>(
    State(studio): State<Studio<B, S>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<JobView>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio.storyboard.generate(id).await.map_err(reject)?;
    studio
        .storyboard
        .scene(id)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("job {} not found", id)))
}

pub async fn reset_scene<B, S>(
    State(studio): State<Studio<B, S>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<JobView>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio.storyboard.reset_scene(id).map(Json).map_err(reject)
}

/// The body is the trimmed cut itself.
pub async fn attach_trim<B, S>(
    State(studio): State<Studio<B, S>>,
    Path(id): Path<JobId>,
    body: Bytes,
) -> ApiResult<Json<JobView>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio.storyboard.attach_trim(id, body).map_err(reject)?;
    studio
        .storyboard
        .scene(id)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("job {} not found", id)))
}

pub async fn clear_trim<B, S>(
    State(studio): State<Studio<B, S>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<JobView>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio.storyboard.clear_trim(id).map(Json).map_err(reject)
}

pub async fn download<B, S>(
    State(studio): State<Studio<B, S>>,
    Path(id): Path<JobId>,
) -> ApiResult<Response>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio
        .storyboard
        .download(id)
        .map(attachment)
        .map_err(reject)
}

pub async fn reorder<B, S>(
    State(studio): State<Studio<B, S>>,
    Json(reorder): Json<Reorder>,
) -> ApiResult<Json<StoryboardPage>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    studio
        .storyboard
        .reorder(reorder.from, reorder.to)
        .map_err(reject)?;
    Ok(Json(page(&studio)))
}

pub async fn reset<B, S>(State(studio): State<Studio<B, S>>) -> Json<Removed>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    Json(Removed {
        removed: studio.storyboard.reset_all(),
    })
}

pub async fn update_settings<B, S>(
    State(studio): State<Studio<B, S>>,
    Json(update): Json<SettingsUpdate>,
) -> Json<StoryboardSettings>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    if let Some(model) = update.model.filter(|m| !m.is_empty()) {
        studio.storyboard.set_model(model);
    }
    if let Some(aspect_ratio) = update.aspect_ratio.filter(|r| !r.is_empty()) {
        studio.storyboard.set_aspect_ratio(aspect_ratio);
    }
    Json(studio.storyboard.settings())
}
