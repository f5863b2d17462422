use crate::domain::jobs::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Published whenever a job record changes status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: JobId,
    pub status: JobStatus,
}

#[derive(Debug)]
pub struct EventHub {
    sender: broadcast::Sender<JobEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        // Slow subscribers lag rather than block pollers
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Returns the number of subscribers reached; zero is not an error.
    pub fn publish(&self, event: JobEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
