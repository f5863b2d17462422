use super::events::EventHub;
use super::photo::PhotoEditor;
use super::single::SingleVideo;
use super::storyboard::Storyboard;
use super::tracker::JobTracker;
use crate::config::StudioConfig;
use crate::ports::generation::GenerationBackend;
use crate::ports::resources::ResourceStore;
use std::sync::Arc;

/// Everything the UI surface works with: the single video slot, the
/// storyboard and the photo editor, sharing one backend and one resource store.
pub struct Studio<B, S> {
    pub config: StudioConfig,
    pub single: SingleVideo<B, S>,
    pub storyboard: Storyboard<B, S>,
    pub photo: PhotoEditor<B, S>,
    store: Arc<S>,
    events: Arc<EventHub>,
}

impl<B, S> Clone for Studio<B, S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            single: self.single.clone(),
            storyboard: self.storyboard.clone(),
            photo: self.photo.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
        }
    }
}

impl<B, S> Studio<B, S>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    pub fn new(config: StudioConfig, backend: Arc<B>, store: Arc<S>) -> Self {
        let events = Arc::new(EventHub::new());
        let tracker = |backend: Arc<B>| {
            JobTracker::new(
                backend,
                store.clone(),
                events.clone(),
                config.poll_policy(),
                config.default_model.clone(),
            )
        };
        let single = SingleVideo::new(tracker(backend.clone()), config.default_aspect_ratio.clone());
        let storyboard =
            Storyboard::new(tracker(backend.clone()), config.default_aspect_ratio.clone());
        let photo = PhotoEditor::new(backend, store.clone(), config.edit_model.clone());

        Self {
            config,
            single,
            storyboard,
            photo,
            store,
            events,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }
}
