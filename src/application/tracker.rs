//! Shared job tracking core.
//!
//! Records live in one ordered list and every mutation looks them up by id,
//! so pollers settling in any order never touch a neighbour and positions can
//! change underneath them. Each polling record owns the cancellation token of
//! its single poller task.

use super::events::{EventHub, JobEvent};
use super::outputs::{Download, JobOutputs, DERIVED_MIME, ORIGINAL_MIME};
use super::poller::{PollOutcome, PollPolicy, Poller};
use crate::domain::errors::{BackendError, JobError};
use crate::domain::jobs::{GenerationParams, JobId, JobStatus, SubmitRequest};
use crate::domain::operation::OperationName;
use crate::ports::generation::GenerationBackend;
use crate::ports::resources::{OwnedHandle, ResourceId, ResourceStore};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct JobRecord {
    pub id: JobId,
    pub params: GenerationParams,
    pub status: JobStatus,
    pub operation: Option<OperationName>,
    /// Bumped on every submission so late answers for older attempts are ignored.
    attempt: u64,
    outputs: JobOutputs,
    cancel: Option<CancellationToken>,
}

impl JobRecord {
    fn new(params: GenerationParams) -> Self {
        Self {
            id: JobId::new(),
            params,
            status: JobStatus::Idle,
            operation: None,
            attempt: 0,
            outputs: JobOutputs::default(),
            cancel: None,
        }
    }

    fn transition(&mut self, next: JobStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.status,
            next
        );
        debug!("Job {}: {:?} -> {:?}", self.id, self.status, next);
        self.status = next;
    }

    fn stop_poller(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }

    fn view(&self) -> JobView {
        JobView {
            id: self.id,
            prompt: self.params.prompt.clone(),
            negative_prompt: self.params.negative_prompt.clone(),
            aspect_ratio: self.params.aspect_ratio.clone(),
            model: self.params.model.clone(),
            has_image: self.params.image.is_some(),
            status: self.status,
            is_generating: self.status.is_generating(),
            operation: self.operation.clone(),
            result: self.outputs.original().cloned(),
            derived: self.outputs.derived().cloned(),
            display: self.outputs.display().cloned(),
        }
    }
}

impl Drop for JobRecord {
    fn drop(&mut self) {
        self.stop_poller();
    }
}

/// Snapshot of a record as the UI sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: JobId,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub aspect_ratio: String,
    pub model: Option<String>,
    pub has_image: bool,
    pub status: JobStatus,
    pub is_generating: bool,
    pub operation: Option<OperationName>,
    pub result: Option<ResourceId>,
    pub derived: Option<ResourceId>,
    pub display: Option<ResourceId>,
}

struct Inner<B, S> {
    backend: Arc<B>,
    store: Arc<S>,
    events: Arc<EventHub>,
    policy: PollPolicy,
    default_model: Mutex<String>,
    records: Mutex<Vec<JobRecord>>,
}

pub struct JobTracker<B, S> {
    inner: Arc<Inner<B, S>>,
}

impl<B, S> Clone for JobTracker<B, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B, S> JobTracker<B, S>
where
    B: GenerationBackend + 'static,
    S: ResourceStore + 'static,
{
    pub fn new(
        backend: Arc<B>,
        store: Arc<S>,
        events: Arc<EventHub>,
        policy: PollPolicy,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                store,
                events,
                policy,
                default_model: Mutex::new(default_model.into()),
                records: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    pub fn default_model(&self) -> String {
        self.inner.default_model.lock().clone()
    }

    pub fn set_default_model(&self, model: impl Into<String>) {
        *self.inner.default_model.lock() = model.into();
    }

    /// Append an idle record. Nothing is submitted.
    pub fn insert(&self, params: GenerationParams) -> JobView {
        let record = JobRecord::new(params);
        let view = record.view();
        self.inner.records.lock().push(record);
        self.inner.publish(view.id, JobStatus::Idle);
        view
    }

    pub fn len(&self) -> usize {
        self.inner.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn view(&self, id: JobId) -> Option<JobView> {
        let records = self.inner.records.lock();
        records.iter().find(|r| r.id == id).map(JobRecord::view)
    }

    pub fn views(&self) -> Vec<JobView> {
        self.inner.records.lock().iter().map(JobRecord::view).collect()
    }

    pub fn position(&self, id: JobId) -> Option<usize> {
        self.inner.records.lock().iter().position(|r| r.id == id)
    }

    /// Edit the creative parameters of a record that is not generating.
    pub fn update_params(
        &self,
        id: JobId,
        update: impl FnOnce(&mut GenerationParams),
    ) -> Result<JobView, JobError> {
        let mut records = self.inner.records.lock();
        let record = find_mut(&mut records, id)?;
        if record.status.is_generating() {
            return Err(JobError::Busy {
                id,
                status: record.status,
            });
        }
        update(&mut record.params);
        Ok(record.view())
    }

    /// Submit a record and attach a poller to it.
    ///
    /// Validation happens before any network call. A record that is already
    /// submitting or polling is left untouched. The submission runs on its own
    /// task, so dropping the returned future never strands the record in
    /// `submitting`.
    pub async fn generate(&self, id: JobId) -> Result<OperationName, JobError> {
        let (request, attempt) = {
            let mut records = self.inner.records.lock();
            let record = find_mut(&mut records, id)?;
            self.begin(record)?
        };
        self.submit(id, attempt, request).await
    }

    /// Replace every record by a new one and submit it, unless a record is
    /// still generating. The check and the replacement happen under one lock.
    pub async fn replace_and_generate(&self, params: GenerationParams) -> Result<JobId, JobError> {
        let (id, attempt, request, replaced) = {
            let mut records = self.inner.records.lock();
            if let Some(busy) = records.iter().find(|r| r.status.is_generating()) {
                return Err(JobError::Busy {
                    id: busy.id,
                    status: busy.status,
                });
            }
            let mut record = JobRecord::new(params);
            let (request, attempt) = self.begin(&mut record)?;
            let id = record.id;
            let replaced = std::mem::replace(&mut *records, vec![record]);
            (id, attempt, request, replaced)
        };
        if !replaced.is_empty() {
            info!("Replaced {} jobs with {}", replaced.len(), id);
        }
        drop(replaced);

        self.submit(id, attempt, request).await?;
        Ok(id)
    }

    /// Move a record to `submitting` and build its backend request.
    fn begin(&self, record: &mut JobRecord) -> Result<(SubmitRequest, u64), JobError> {
        if record.status.is_generating() {
            debug!(
                "Job {} is already {:?}, ignoring generate",
                record.id, record.status
            );
            return Err(JobError::Busy {
                id: record.id,
                status: record.status,
            });
        }
        if record.status == JobStatus::Succeeded {
            return Err(JobError::AlreadySucceeded(record.id));
        }
        record.params.validate()?;

        let request = record.params.to_request(&self.inner.default_model.lock());
        record.attempt += 1;
        record.operation = None;
        record.transition(JobStatus::Submitting);
        Ok((request, record.attempt))
    }

    async fn submit(
        &self,
        id: JobId,
        attempt: u64,
        request: SubmitRequest,
    ) -> Result<OperationName, JobError> {
        self.inner.publish(id, JobStatus::Submitting);
        info!("Job {}: submitting with model {}", id, request.model);

        let tracker = self.clone();
        let task = tokio::spawn(async move {
            let submitted = tracker.inner.backend.submit(&request).await;
            tracker.apply_submission(id, attempt, submitted)
        });
        match task.await {
            Ok(result) => result,
            Err(e) => {
                let failure = BackendError::Transport(format!("submission task failed: {}", e));
                self.apply_submission(id, attempt, Err(failure))
            }
        }
    }

    fn apply_submission(
        &self,
        id: JobId,
        attempt: u64,
        submitted: Result<OperationName, BackendError>,
    ) -> Result<OperationName, JobError> {
        let mut records = self.inner.records.lock();
        let record = records
            .iter_mut()
            .find(|r| r.id == id && r.attempt == attempt && r.status == JobStatus::Submitting);
        let Some(record) = record else {
            warn!("Job {} was reset or removed while submitting", id);
            return Err(JobError::Superseded(id));
        };

        match submitted {
            Ok(operation) => {
                let cancel = CancellationToken::new();
                record.operation = Some(operation.clone());
                record.cancel = Some(cancel.clone());
                record.transition(JobStatus::Polling);
                drop(records);

                info!("Job {}: polling operation {}", id, operation);
                self.spawn_poller(id, attempt, operation.clone(), cancel);
                self.inner.publish(id, JobStatus::Polling);
                Ok(operation)
            }
            Err(e) => {
                record.transition(JobStatus::Idle);
                drop(records);

                warn!("Job {}: submission failed: {}", id, e);
                self.inner.publish(id, JobStatus::Idle);
                Err(JobError::Submission(e))
            }
        }
    }

    fn spawn_poller(
        &self,
        id: JobId,
        attempt: u64,
        operation: OperationName,
        cancel: CancellationToken,
    ) {
        let poller = Poller::new(
            id,
            operation,
            self.inner.backend.clone(),
            self.inner.policy,
            cancel,
        );
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = poller.run().await;
            inner.settle(id, attempt, outcome);
        });
    }

    /// Return a record to `idle`, stopping its poller and releasing its assets.
    pub fn reset_job(&self, id: JobId) -> Result<JobView, JobError> {
        let view = {
            let mut records = self.inner.records.lock();
            let record = find_mut(&mut records, id)?;
            record.stop_poller();
            record.outputs.clear();
            record.operation = None;
            // Invalidates any submission still in flight.
            record.attempt += 1;
            record.status = JobStatus::Idle;
            record.view()
        };
        self.inner.publish(id, JobStatus::Idle);
        Ok(view)
    }

    /// Remove a record; its poller stops and its handles are revoked.
    pub fn remove(&self, id: JobId) -> Result<(), JobError> {
        let record = {
            let mut records = self.inner.records.lock();
            let index = records
                .iter()
                .position(|r| r.id == id)
                .ok_or(JobError::NotFound(id))?;
            records.remove(index)
        };
        info!("Job {} removed", id);
        drop(record);
        Ok(())
    }

    /// Move the record at `from` to `to`. Status, handles and pollers are untouched.
    pub fn reorder(&self, from: usize, to: usize) -> Result<(), JobError> {
        let mut records = self.inner.records.lock();
        let len = records.len();
        if from >= len || to >= len {
            return Err(JobError::OutOfRange { from, to, len });
        }
        let record = records.remove(from);
        records.insert(to, record);
        Ok(())
    }

    /// Remove every record. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let drained: Vec<JobRecord> = std::mem::take(&mut *self.inner.records.lock());
        let count = drained.len();
        drop(drained);
        if count > 0 {
            info!("Cleared {} jobs", count);
        }
        count
    }

    /// Install a derived variant (for instance a trimmed cut) of a finished job.
    pub fn attach_derived(&self, id: JobId, bytes: Bytes) -> Result<ResourceId, JobError> {
        let mut records = self.inner.records.lock();
        let record = find_mut(&mut records, id)?;
        if record.outputs.original().is_none() {
            return Err(JobError::NoResult(id));
        }
        let store: Arc<dyn ResourceStore> = self.inner.store.clone();
        let handle = OwnedHandle::create(store, bytes, DERIVED_MIME);
        let derived = handle.id().clone();
        record.outputs.set_derived(handle);
        Ok(derived)
    }

    /// Drop the derived variant so the original shows again.
    pub fn clear_derived(&self, id: JobId) -> Result<JobView, JobError> {
        let mut records = self.inner.records.lock();
        let record = find_mut(&mut records, id)?;
        record.outputs.clear_derived();
        Ok(record.view())
    }

    pub fn download(&self, id: JobId, stem: &str) -> Result<Download, JobError> {
        let records = self.inner.records.lock();
        let record = records
            .iter()
            .find(|r| r.id == id)
            .ok_or(JobError::NotFound(id))?;
        record.outputs.download(stem).ok_or(JobError::NoResult(id))
    }
}

impl<B, S> Inner<B, S>
where
    S: ResourceStore + 'static,
{
    fn publish(&self, id: JobId, status: JobStatus) {
        self.events.publish(JobEvent { id, status });
    }

    /// Apply a poller's outcome to the record it was started for.
    fn settle(&self, id: JobId, attempt: u64, outcome: PollOutcome) {
        let mut records = self.records.lock();
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            debug!("Job {} settled after removal, discarding", id);
            return;
        };
        if record.attempt != attempt || record.status != JobStatus::Polling {
            debug!("Job {} settled for a stale attempt, discarding", id);
            return;
        }

        let status = match outcome {
            PollOutcome::Succeeded { uri, asset } => {
                debug!("Job {} result {} ({} bytes)", id, uri, asset.len());
                let store: Arc<dyn ResourceStore> = self.store.clone();
                record
                    .outputs
                    .set_original(OwnedHandle::create(store, asset, ORIGINAL_MIME));
                JobStatus::Succeeded
            }
            PollOutcome::Failed(failure) => {
                warn!("Job {} failed: {:?}", id, failure);
                JobStatus::Failed
            }
            PollOutcome::Cancelled => return,
        };
        record.cancel = None;
        record.transition(status);
        drop(records);

        info!("Job {} settled as {:?}", id, status);
        self.publish(id, status);
    }
}

fn find_mut(records: &mut [JobRecord], id: JobId) -> Result<&mut JobRecord, JobError> {
    records
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or(JobError::NotFound(id))
}
