//! Durable per-stage job queues with deterministic job identities.

mod dispatcher;
mod sqlite_queue;
mod traits;
mod types;

pub use dispatcher::Dispatcher;
pub use sqlite_queue::SqliteJobQueue;
pub use traits::{JobQueue, QueueError};
pub use types::{
    EnqueueRequest, Job, JobHandle, JobId, JobPayload, JobState, Stage, StageCounts,
    SubmitOutcome,
};
