//! HTTP inbound adapter.
//!
//! Exposes the single video slot, the storyboard, the photo editor, live blobs
//! and a stream of job status events to the browser UI.

mod form;
pub mod photo;
pub mod storyboard;
pub mod video;

use crate::application::outputs::Download;
use crate::application::studio::Studio;
use crate::domain::errors::JobError;
use crate::ports::generation::GenerationBackend;
use crate::ports::resources::{ResourceId, ResourceStore};
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Router,
};
use futures::{stream, Stream};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

pub type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Map an application error onto the status code the UI expects.
pub fn reject(err: JobError) -> (StatusCode, String) {
    let status = match &err {
        JobError::Validation(_) | JobError::OutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        JobError::NotFound(_)
        | JobError::NoResult(_)
        | JobError::NoJob
        | JobError::NoTurn(_) => StatusCode::NOT_FOUND,
        JobError::Busy { .. }
        | JobError::AlreadySucceeded(_)
        | JobError::Superseded(_)
        | JobError::EditInProgress
        | JobError::EditDiscarded => StatusCode::CONFLICT,
        JobError::Submission(_) | JobError::ImageGeneration(_) => StatusCode::BAD_GATEWAY,
    };
    if status == StatusCode::BAD_GATEWAY {
        warn!("{}", err);
    }
    (status, err.to_string())
}

fn attachment(download: Download) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", download.file_name);
    (
        [
            (header::CONTENT_TYPE, download.mime),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response()
}

pub fn router<B, S>(studio: Studio<B, S>) -> Router
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/storyboard", get(storyboard::show::<B, S>))
        .route("/api/storyboard/scenes", post(storyboard::add_scene::<B, S>))
        .route(
            "/api/storyboard/scenes/:id",
            post(storyboard::update_scene::<B, S>).delete(storyboard::remove_scene::<B, S>),
        )
        .route(
            "/api/storyboard/scenes/:id/generate",
            post(storyboard::generate_scene::<B, S>),
        )
        .route(
            "/api/storyboard/scenes/:id/reset",
            post(storyboard::reset_scene::<B, S>),
        )
        .route(
            "/api/storyboard/scenes/:id/trim",
            put(storyboard::attach_trim::<B, S>).delete(storyboard::clear_trim::<B, S>),
        )
        .route(
            "/api/storyboard/scenes/:id/download",
            get(storyboard::download::<B, S>),
        )
        .route("/api/storyboard/reorder", post(storyboard::reorder::<B, S>))
        .route("/api/storyboard/reset", post(storyboard::reset::<B, S>))
        .route(
            "/api/storyboard/settings",
            put(storyboard::update_settings::<B, S>),
        )
        .route("/api/video", get(video::show::<B, S>))
        .route("/api/video/image", post(video::generate_image::<B, S>))
        .route("/api/video/upload", post(video::upload_image::<B, S>))
        .route("/api/video/generate", post(video::generate::<B, S>))
        .route(
            "/api/video/trim",
            put(video::attach_trim::<B, S>).delete(video::clear_trim::<B, S>),
        )
        .route("/api/video/download", get(video::download::<B, S>))
        .route("/api/video/reset", post(video::reset::<B, S>))
        .route("/api/photo-editor", get(photo::show::<B, S>))
        .route(
            "/api/photo-editor/references",
            post(photo::add_references::<B, S>).delete(photo::clear_references::<B, S>),
        )
        .route("/api/photo-editor/generate", post(photo::edit::<B, S>))
        .route(
            "/api/photo-editor/turns/:index/download",
            get(photo::download::<B, S>),
        )
        .route("/api/photo-editor/reset", post(photo::reset::<B, S>))
        .route("/api/events", get(events::<B, S>))
        .route("/blobs/:id", get(blob::<B, S>))
        .layer(cors)
        .layer(DefaultBodyLimit::disable())
        .with_state(studio)
}

/// Serve a live resource; revoked handles are gone.
async fn blob<B, S>(State(studio): State<Studio<B, S>>, Path(id): Path<String>) -> Response
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    match studio.store().get(&ResourceId(id)) {
        Some(blob) => ([(header::CONTENT_TYPE, blob.mime)], blob.bytes).into_response(),
        None => (StatusCode::NOT_FOUND, "resource was released").into_response(),
    }
}

async fn events<B, S>(
    State(studio): State<Studio<B, S>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    let rx = studio.events().subscribe();
    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let event = Event::default().event("job").json_data(&event);
                    return Some((event, rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
