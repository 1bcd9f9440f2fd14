//! Enqueue entry point shared by stage handlers, operators and the scheduler.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::metrics;

use super::{JobHandle, JobPayload, JobQueue, QueueError, SubmitOutcome};

/// Routes payloads to their stage queue under a deterministic job id.
///
/// Also owns the workflow lock that serialises enqueue passes and batch
/// freezes, so a freeze cannot interleave with pending-object selection.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
    workflow_lock: Arc<Mutex<()>>,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self {
            queue,
            workflow_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The underlying queue backend.
    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Submit a payload.
    ///
    /// An active job with the same id and payload absorbs the submission. A
    /// queued job with a different payload takes the new one; while it runs
    /// the submission fails with [`QueueError::JobRunning`] and can be retried.
    pub async fn enqueue(&self, payload: JobPayload) -> Result<JobHandle, QueueError> {
        let stage = payload.stage();
        let job_id = payload.job_id();

        let outcome = match self.queue.submit(&job_id, &payload).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to enqueue job");
                metrics::JOBS_ENQUEUED
                    .with_label_values(&[stage.queue_name(), "error"])
                    .inc();
                return Err(e);
            }
        };

        let (accepted, result) = match outcome {
            SubmitOutcome::Accepted => (true, "accepted"),
            SubmitOutcome::Replaced => (true, "replaced"),
            SubmitOutcome::AlreadyActive => (false, "already_active"),
        };
        metrics::JOBS_ENQUEUED
            .with_label_values(&[stage.queue_name(), result])
            .inc();
        debug!(job_id = %job_id, stage = %stage, accepted, "Job submitted");

        Ok(JobHandle {
            job_id,
            stage,
            accepted,
        })
    }

    /// Hold the workflow-wide lock for the lifetime of the guard.
    pub async fn lock_workflow(&self) -> MutexGuard<'_, ()> {
        self.workflow_lock.lock().await
    }
}
