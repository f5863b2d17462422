//! Conversational photo editor.
//!
//! Each edit sends the prompt, the attached reference images and the two most
//! recent results to the image model, so follow-up prompts refine the last
//! picture instead of starting over.

use super::outputs::Download;
use crate::domain::errors::{BackendError, JobError, ValidationError};
use crate::domain::jobs::{ImageEditRequest, ImageSource};
use crate::domain::operation::GeneratedImage;
use crate::ports::generation::GenerationBackend;
use crate::ports::resources::{OwnedHandle, ResourceId, ResourceStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

pub const PHOTO_FILE_STEM: &str = "photo-edit";

/// Earlier results sent along with every edit.
pub const CONTEXT_TURNS: usize = 2;

#[derive(Debug)]
struct Turn {
    prompt: String,
    image: ImageSource,
    preview: OwnedHandle,
}

#[derive(Debug, Default)]
struct Session {
    references: Vec<ImageSource>,
    turns: Vec<Turn>,
    editing: bool,
    /// Bumped by `reset` so a late answer never lands in a fresh session.
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnView {
    pub index: usize,
    pub prompt: String,
    pub preview: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoEditorView {
    pub references: usize,
    pub editing: bool,
    pub turns: Vec<TurnView>,
}

pub struct PhotoEditor<B, S> {
    backend: Arc<B>,
    store: Arc<S>,
    model: String,
    session: Arc<Mutex<Session>>,
}

impl<B, S> Clone for PhotoEditor<B, S> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            store: self.store.clone(),
            model: self.model.clone(),
            session: self.session.clone(),
        }
    }
}

impl<B, S> PhotoEditor<B, S>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    pub fn new(backend: Arc<B>, store: Arc<S>, model: impl Into<String>) -> Self {
        Self {
            backend,
            store,
            model: model.into(),
            session: Arc::new(Mutex::new(Session::default())),
        }
    }

    pub fn view(&self) -> PhotoEditorView {
        let session = self.session.lock();
        PhotoEditorView {
            references: session.references.len(),
            editing: session.editing,
            turns: session
                .turns
                .iter()
                .enumerate()
                .map(|(index, turn)| TurnView {
                    index,
                    prompt: turn.prompt.clone(),
                    preview: turn.preview.id().clone(),
                })
                .collect(),
        }
    }

    /// Attach reference images; they stay attached across edits.
    pub fn add_references(&self, images: Vec<ImageSource>) -> usize {
        let mut session = self.session.lock();
        session.references.extend(images);
        session.references.len()
    }

    pub fn clear_references(&self) {
        self.session.lock().references.clear();
    }

    /// Run one edit and record its result as a new turn.
    ///
    /// The model call runs on its own task, so an abandoned request still
    /// clears the editing flag once the backend answers.
    pub async fn edit(&self, prompt: &str) -> Result<TurnView, JobError> {
        if prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt.into());
        }

        let (request, generation) = {
            let mut session = self.session.lock();
            if session.editing {
                return Err(JobError::EditInProgress);
            }
            session.editing = true;
            let skip = session.turns.len().saturating_sub(CONTEXT_TURNS);
            let request = ImageEditRequest {
                prompt: prompt.to_string(),
                model: self.model.clone(),
                references: session.references.clone(),
                context: session.turns[skip..]
                    .iter()
                    .map(|turn| turn.image.clone())
                    .collect(),
            };
            (request, session.generation)
        };

        let editor = self.clone();
        let task = tokio::spawn(async move {
            let edited = editor.backend.edit_image(&request).await;
            editor.finish(generation, request.prompt, edited)
        });
        match task.await {
            Ok(result) => result,
            Err(e) => {
                let failure = BackendError::Transport(format!("edit task failed: {}", e));
                self.finish(generation, prompt.to_string(), Err(failure))
            }
        }
    }

    fn finish(
        &self,
        generation: u64,
        prompt: String,
        edited: Result<GeneratedImage, BackendError>,
    ) -> Result<TurnView, JobError> {
        let image = edited.and_then(|image| {
            ImageSource::from_base64(&image.image_bytes, &image.mime_type)
                .map_err(|e| BackendError::Decode(e.to_string()))
        });

        let mut session = self.session.lock();
        if session.generation != generation {
            return Err(JobError::EditDiscarded);
        }
        session.editing = false;

        let image = image.map_err(|e| {
            warn!("Photo edit failed: {}", e);
            JobError::ImageGeneration(e)
        })?;
        let store: Arc<dyn ResourceStore> = self.store.clone();
        let preview = OwnedHandle::create(store, image.bytes().clone(), image.mime());
        let view = TurnView {
            index: session.turns.len(),
            prompt: prompt.clone(),
            preview: preview.id().clone(),
        };
        session.turns.push(Turn {
            prompt,
            image,
            preview,
        });

        info!("Photo edit {} stored as {}", view.index + 1, view.preview);
        Ok(view)
    }

    pub fn download(&self, index: usize) -> Result<Download, JobError> {
        let session = self.session.lock();
        let turn = session.turns.get(index).ok_or(JobError::NoTurn(index))?;
        Ok(Download {
            file_name: format!("{}-{}.png", PHOTO_FILE_STEM, index + 1),
            mime: turn.image.mime().to_string(),
            bytes: turn.image.bytes().clone(),
        })
    }

    /// Forget every turn and reference, releasing all previews.
    pub fn reset(&self) {
        let turns = {
            let mut session = self.session.lock();
            session.generation += 1;
            session.editing = false;
            session.references.clear();
            std::mem::take(&mut session.turns)
        };
        drop(turns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::config::DEFAULT_EDIT_MODEL;
    use crate::ports::generation::MockGenerationBackend;
    use base64::Engine;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn editor(
        backend: MockGenerationBackend,
    ) -> (PhotoEditor<MockGenerationBackend, MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            PhotoEditor::new(Arc::new(backend), store.clone(), DEFAULT_EDIT_MODEL),
            store,
        )
    }

    fn encoded(text: &str) -> GeneratedImage {
        GeneratedImage {
            image_bytes: base64::engine::general_purpose::STANDARD.encode(text),
            mime_type: "image/png".to_string(),
        }
    }

    fn photo(name: &str) -> ImageSource {
        ImageSource::Upload {
            bytes: Bytes::from(name.to_string()),
            file_name: format!("{}.jpg", name),
            mime: "image/jpeg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_edits_carry_the_last_two_results() {
        let mut backend = MockGenerationBackend::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen: Arc<Mutex<Vec<Vec<Bytes>>>> = Arc::default();
        let record = seen.clone();
        backend
            .expect_edit_image()
            .times(4)
            .withf(|request| request.model == DEFAULT_EDIT_MODEL && request.references.len() == 1)
            .returning(move |request| {
                let context = request.context.iter().map(|i| i.bytes().clone()).collect();
                record.lock().push(context);
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(encoded(&format!("edit {}", n)))
            });
        let (editor, store) = editor(backend);

        assert_eq!(editor.add_references(vec![photo("portrait")]), 1);
        for prompt in ["add a hat", "make it red", "add snow", "zoom out"] {
            editor.edit(prompt).await.unwrap();
        }

        let contexts = seen.lock().clone();
        assert!(contexts[0].is_empty());
        assert_eq!(contexts[1], vec![Bytes::from("edit 1")]);
        assert_eq!(contexts[2], vec![Bytes::from("edit 1"), Bytes::from("edit 2")]);
        assert_eq!(contexts[3], vec![Bytes::from("edit 2"), Bytes::from("edit 3")]);

        let view = editor.view();
        assert_eq!(view.turns.len(), 4);
        assert_eq!(view.turns[3].prompt, "zoom out");
        assert!(!view.editing);
        assert_eq!(
            store.get(&view.turns[3].preview).unwrap().bytes.as_ref(),
            b"edit 4"
        );

        let download = editor.download(1).unwrap();
        assert_eq!(download.file_name, "photo-edit-2.png");
        assert_eq!(download.bytes.as_ref(), b"edit 2");
        assert!(matches!(editor.download(9), Err(JobError::NoTurn(9))));

        editor.reset();
        assert_eq!(store.stats().live, 0);
        assert_eq!(store.stats().revoked, 4);
        assert_eq!(editor.view().references, 0);
    }

    #[tokio::test]
    async fn test_empty_prompt_never_reaches_the_model() {
        let mut backend = MockGenerationBackend::new();
        backend.expect_edit_image().times(0);
        let (editor, _) = editor(backend);

        assert!(matches!(
            editor.edit("  ").await,
            Err(JobError::Validation(ValidationError::EmptyPrompt))
        ));
        assert!(!editor.view().editing);
    }

    #[tokio::test]
    async fn test_failed_edit_keeps_the_session_usable() {
        let mut backend = MockGenerationBackend::new();
        let calls = Arc::new(AtomicUsize::new(0));
        backend.expect_edit_image().times(2).returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(BackendError::Status {
                    status: 500,
                    body: "safety filter".to_string(),
                })
            } else {
                Ok(encoded("second try"))
            }
        });
        let (editor, store) = editor(backend);

        assert!(matches!(
            editor.edit("a castle").await,
            Err(JobError::ImageGeneration(BackendError::Status { status: 500, .. }))
        ));
        assert!(editor.view().turns.is_empty());
        assert_eq!(store.stats().created, 0);

        let turn = editor.edit("a castle").await.unwrap();
        assert_eq!(turn.index, 0);
        editor.clear_references();
        assert_eq!(editor.view().references, 0);
    }

    #[tokio::test]
    async fn test_undecodable_image_is_an_image_generation_error() {
        let mut backend = MockGenerationBackend::new();
        backend.expect_edit_image().returning(|_| {
            Ok(GeneratedImage {
                image_bytes: "@@@".to_string(),
                mime_type: "image/png".to_string(),
            })
        });
        let (editor, _) = editor(backend);

        assert!(matches!(
            editor.edit("a bridge").await,
            Err(JobError::ImageGeneration(BackendError::Decode(_)))
        ));
        assert!(!editor.view().editing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_edit_at_a_time_and_reset_discards_late_results() {
        let backend = Arc::new(SlowEdit);
        let store = Arc::new(MemoryStore::new());
        let editor = PhotoEditor::new(backend, store.clone(), DEFAULT_EDIT_MODEL);

        let running = tokio::spawn({
            let editor = editor.clone();
            async move { editor.edit("paint it blue").await }
        });
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert!(editor.view().editing);
        assert!(matches!(
            editor.edit("paint it green").await,
            Err(JobError::EditInProgress)
        ));

        editor.reset();
        assert!(matches!(
            running.await.unwrap(),
            Err(JobError::EditDiscarded)
        ));
        assert!(editor.view().turns.is_empty());
        assert_eq!(store.stats().created, 0);
    }

    /// Image model that takes ten seconds per edit.
    struct SlowEdit;

    #[async_trait::async_trait]
    impl GenerationBackend for SlowEdit {
        async fn submit(
            &self,
            _: &crate::domain::jobs::SubmitRequest,
        ) -> Result<String, BackendError> {
            Err(BackendError::MissingOperation)
        }

        async fn poll(
            &self,
            _: &str,
        ) -> Result<crate::domain::operation::OperationStatus, BackendError> {
            Err(BackendError::MissingOperation)
        }

        async fn fetch(&self, _: &str) -> Result<Bytes, BackendError> {
            Err(BackendError::MissingOperation)
        }

        async fn generate_image(&self, _: &str) -> Result<GeneratedImage, BackendError> {
            Err(BackendError::MissingOperation)
        }

        async fn edit_image(&self, _: &ImageEditRequest) -> Result<GeneratedImage, BackendError> {
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
            Ok(encoded("late"))
        }
    }
}
