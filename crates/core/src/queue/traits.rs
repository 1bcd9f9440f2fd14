//! Job queue backend boundary.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::{Job, JobId, JobPayload, JobState, Stage, StageCounts, SubmitOutcome};

/// Queue backend failures. Always infrastructure errors from the workflow's point of view.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The backend could not be reached or failed.
    #[error("queue backend error: {0}")]
    Backend(String),

    /// A stored payload could not be encoded or decoded.
    #[error("job serialization error: {0}")]
    Serialization(String),

    /// A job with the same id is running a different payload.
    #[error("job {0} is running with a different payload")]
    JobRunning(String),
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Durable per-stage queues keyed by job id.
///
/// `submit` reserves the id atomically. An identical payload is merged into
/// the active job with that id. A different payload replaces a queued job and
/// is refused while the job runs. A failed job with the same id is replaced.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Reserve `id` and queue the payload, merging or replacing an active job with that id.
    async fn submit(&self, id: &JobId, payload: &JobPayload) -> Result<SubmitOutcome, QueueError>;

    /// Take the oldest runnable job of a stage and mark it running.
    async fn claim(&self, stage: Stage) -> Result<Option<Job>, QueueError>;

    /// Remove a finished job, freeing its id.
    async fn complete(&self, id: &JobId) -> Result<(), QueueError>;

    /// Put a running job back in its queue after `delay`.
    async fn retry(&self, id: &JobId, error: &str, delay: Duration) -> Result<(), QueueError>;

    /// Park a job as failed.
    async fn fail(&self, id: &JobId, error: &str) -> Result<(), QueueError>;

    /// Delete every job of an object that is not currently running.
    async fn delete_jobs_for_object(&self, object_id: i64) -> Result<usize, QueueError>;

    /// Objects with a job in any stage, failed jobs included.
    async fn enqueued_object_ids(&self) -> Result<HashSet<i64>, QueueError>;

    /// Objects with a running job in any stage.
    async fn running_object_ids(&self) -> Result<HashSet<i64>, QueueError>;

    /// Jobs filtered by stage and state, oldest first.
    async fn list(
        &self,
        stage: Option<Stage>,
        state: Option<JobState>,
        limit: usize,
    ) -> Result<Vec<Job>, QueueError>;

    /// Queue depth per stage.
    async fn counts(&self) -> Result<Vec<StageCounts>, QueueError>;

    /// Requeue jobs left running by a worker that went away.
    async fn recover_running(&self) -> Result<usize, QueueError>;
}
