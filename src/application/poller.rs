//! Status polling for one long-running generation.
//!
//! A `Poller` walks `Scheduled -> Checking -> (Scheduled | Fetching -> Settled)`.
//! The first check only happens after one full interval. Transient check
//! failures re-arm the timer; a done operation without a result URI, a failed
//! download or an exhausted attempt budget settle as failures.

use crate::domain::errors::BackendError;
use crate::domain::jobs::JobId;
use crate::domain::operation::OperationName;
use crate::ports::generation::GenerationBackend;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay between status checks, also applied before the first one.
pub const POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Status checks allowed before a job is given up on (30 minutes at the default interval).
pub const MAX_POLL_ATTEMPTS: u32 = 360;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the operation settles or the poller is cancelled.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            max_attempts: Some(MAX_POLL_ATTEMPTS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollFailure {
    /// The backend reported completion without anything to download.
    NoResult,
    /// The backend reported success but the asset could not be retrieved.
    Fetch(BackendError),
    Exhausted { attempts: u32 },
}

#[derive(Debug)]
pub enum PollOutcome {
    Succeeded { uri: String, asset: Bytes },
    Failed(PollFailure),
    Cancelled,
}

pub struct Poller<B: ?Sized> {
    job: JobId,
    operation: OperationName,
    backend: Arc<B>,
    policy: PollPolicy,
    cancel: CancellationToken,
    attempts: u32,
}

impl<B> Poller<B>
where
    B: GenerationBackend + ?Sized,
{
    pub fn new(
        job: JobId,
        operation: OperationName,
        backend: Arc<B>,
        policy: PollPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job,
            operation,
            backend,
            policy,
            cancel,
            attempts: 0,
        }
    }

    /// Drive the operation until it settles or the token is cancelled.
    pub async fn run(mut self) -> PollOutcome {
        let cancel = self.cancel.clone();
        let backend = self.backend.clone();
        let operation = self.operation.clone();

        loop {
            let elapsed = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = tokio::time::sleep(self.policy.interval) => true,
            };
            if !elapsed || cancel.is_cancelled() {
                return self.cancelled();
            }

            self.attempts += 1;
            let check = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                check = backend.poll(&operation) => Some(check),
            };
            let Some(check) = check else {
                return self.cancelled();
            };

            match check {
                Ok(status) if status.done => {
                    return match status.result_uri() {
                        Some(uri) => self.fetch(uri.to_string()).await,
                        None => {
                            warn!(
                                "Job {} operation {} finished without a result",
                                self.job, self.operation
                            );
                            PollOutcome::Failed(PollFailure::NoResult)
                        }
                    };
                }
                Ok(_) => debug!(
                    "Job {} check {}: operation {} still running",
                    self.job, self.attempts, self.operation
                ),
                Err(e) => warn!(
                    "Job {} check {}: status query failed, retrying: {}",
                    self.job, self.attempts, e
                ),
            }

            if let Some(max) = self.policy.max_attempts {
                if self.attempts >= max {
                    warn!("Job {} gave up after {} checks", self.job, self.attempts);
                    return PollOutcome::Failed(PollFailure::Exhausted {
                        attempts: self.attempts,
                    });
                }
            }
        }
    }

    async fn fetch(&self, uri: String) -> PollOutcome {
        let cancel = self.cancel.clone();
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            fetched = self.backend.fetch(&uri) => Some(fetched),
        };

        match fetched {
            None => self.cancelled(),
            Some(Ok(asset)) => {
                info!(
                    "Job {} fetched {} bytes from {} after {} checks",
                    self.job,
                    asset.len(),
                    uri,
                    self.attempts
                );
                PollOutcome::Succeeded { uri, asset }
            }
            Some(Err(e)) => {
                warn!("Job {} could not download {}: {}", self.job, uri, e);
                PollOutcome::Failed(PollFailure::Fetch(e))
            }
        }
    }

    fn cancelled(&self) -> PollOutcome {
        debug!("Job {} poller cancelled", self.job);
        PollOutcome::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::operation::OperationStatus;
    use crate::ports::generation::MockGenerationBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn poller(backend: MockGenerationBackend, policy: PollPolicy) -> Poller<MockGenerationBackend> {
        Poller::new(
            JobId::new(),
            "operations/test".to_string(),
            Arc::new(backend),
            policy,
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_check() {
        let mut backend = MockGenerationBackend::new();
        let checks = Arc::new(AtomicUsize::new(0));
        let counter = checks.clone();
        backend.expect_poll().times(3).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(OperationStatus::pending())
            } else {
                Ok(OperationStatus::completed("files/video-1"))
            }
        });
        backend
            .expect_fetch()
            .withf(|uri| uri == "files/video-1")
            .times(1)
            .returning(|_| Ok(Bytes::from_static(b"mp4 data")));

        let start = Instant::now();
        let outcome = poller(backend, PollPolicy::default()).run().await;

        assert!(start.elapsed() >= POLL_INTERVAL * 3);
        assert_eq!(checks.load(Ordering::SeqCst), 3);
        match outcome {
            PollOutcome::Succeeded { uri, asset } => {
                assert_eq!(uri, "files/video-1");
                assert_eq!(asset.as_ref(), b"mp4 data");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_check_waits_one_interval() {
        let mut backend = MockGenerationBackend::new();
        backend
            .expect_poll()
            .times(1)
            .returning(|_| Ok(OperationStatus::completed_empty()));
        backend.expect_fetch().times(0);

        let start = Instant::now();
        let outcome = poller(backend, PollPolicy::default()).run().await;

        assert!(start.elapsed() >= POLL_INTERVAL);
        assert!(start.elapsed() < POLL_INTERVAL * 2);
        assert!(matches!(outcome, PollOutcome::Failed(PollFailure::NoResult)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_keep_polling() {
        let mut backend = MockGenerationBackend::new();
        let checks = Arc::new(AtomicUsize::new(0));
        let counter = checks.clone();
        backend.expect_poll().times(3).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(BackendError::Transport("connection reset".to_string()))
            } else {
                Ok(OperationStatus::completed("files/video-2"))
            }
        });
        backend
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(Bytes::from_static(b"video")));

        let outcome = poller(backend, PollPolicy::default()).run().await;
        assert!(matches!(outcome, PollOutcome::Succeeded { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_settles_as_failed() {
        let mut backend = MockGenerationBackend::new();
        backend
            .expect_poll()
            .times(1)
            .returning(|_| Ok(OperationStatus::completed("files/gone")));
        backend.expect_fetch().times(1).returning(|_| {
            Err(BackendError::Status {
                status: 404,
                body: "not found".to_string(),
            })
        });

        let outcome = poller(backend, PollPolicy::default()).run().await;
        match outcome {
            PollOutcome::Failed(PollFailure::Fetch(BackendError::Status { status, .. })) => {
                assert_eq!(status, 404)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_is_enforced() {
        let mut backend = MockGenerationBackend::new();
        backend
            .expect_poll()
            .times(4)
            .returning(|_| Ok(OperationStatus::pending()));

        let policy = PollPolicy {
            interval: Duration::from_millis(100),
            max_attempts: Some(4),
        };
        let outcome = poller(backend, policy).run().await;
        assert!(matches!(
            outcome,
            PollOutcome::Failed(PollFailure::Exhausted { attempts: 4 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_check() {
        let mut backend = MockGenerationBackend::new();
        backend.expect_poll().times(0);

        let cancel = CancellationToken::new();
        let poller = Poller::new(
            JobId::new(),
            "operations/test".to_string(),
            Arc::new(backend),
            PollPolicy::default(),
            cancel.clone(),
        );
        let task = tokio::spawn(poller.run());

        tokio::time::sleep(POLL_INTERVAL / 2).await;
        cancel.cancel();

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, PollOutcome::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_stops_rescheduling() {
        let mut backend = MockGenerationBackend::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        // Cancelled during the first check: no second check may follow.
        backend.expect_poll().times(1).returning(move |_| {
            trigger.cancel();
            Ok(OperationStatus::pending())
        });

        let poller = Poller::new(
            JobId::new(),
            "operations/test".to_string(),
            Arc::new(backend),
            PollPolicy::default(),
            cancel,
        );
        let outcome = poller.run().await;
        assert!(matches!(outcome, PollOutcome::Cancelled));
    }
}
