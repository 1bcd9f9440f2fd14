//! Background execution of queued jobs.

mod locks;
mod runner;

pub use locks::ObjectLocks;
pub use runner::{JobReport, JobResult, WorkerPool, WorkerSettings, WorkerStatus};
