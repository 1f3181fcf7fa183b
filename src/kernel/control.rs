//! The control interface: the operations an API layer drives against
//! the dispatcher. Kept deliberately thin — each call is a direct
//! delegation, not a place to put business logic.

use std::sync::Arc;
use std::time::Duration;

use crate::common::entity_ids::{ExecutionId, JobId, UserId};
use crate::common::Result;

use super::dispatcher::{Dispatcher, DispatcherStats};

#[derive(Clone)]
pub struct Control {
    dispatcher: Arc<Dispatcher>,
}

impl Control {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Arm (or rearm) a job after it is created or its schedule-affecting
    /// fields change.
    pub async fn add_job(&self, id: JobId) -> Result<()> {
        self.dispatcher.add_job(id).await
    }

    /// Disarm a job. Any in-flight firing completes normally; only future
    /// scheduled firings are cancelled.
    pub fn remove_job(&self, id: JobId) {
        self.dispatcher.remove_job(id)
    }

    /// Fire a job immediately, independent of its scheduled firings.
    pub async fn trigger(&self, user_id: UserId, id: JobId) -> Result<ExecutionId> {
        self.dispatcher.trigger(user_id, id).await
    }

    /// Drain in-flight firings (up to `deadline`, capped at 30s), then
    /// disarm every job.
    pub async fn shutdown(&self, deadline: Duration) {
        self.dispatcher.shutdown(deadline).await
    }

    pub fn stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }
}
