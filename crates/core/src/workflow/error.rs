//! Workflow error taxonomy.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::queue::{QueueError, Stage};
use crate::store::StoreError;
use crate::toolkit::ToolkitError;

/// Errors returned by stage handlers and operator actions.
///
/// Only infrastructure failures are retried; see [`WorkflowError::is_retryable`].
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A package with this filename already exists.
    #[error("Package with filename {filename} already exists")]
    DuplicatePackage { filename: String },

    #[error("museum object not found: {0}")]
    ObjectNotFound(i64),

    #[error("package not found: {0}")]
    PackageNotFound(String),

    /// The object is frozen and must be unfrozen by an operator first.
    #[error("museum object {0} is frozen")]
    ObjectFrozen(i64),

    #[error("package {0} is cancelled")]
    PackageCancelled(String),

    /// A newer run of the object superseded this package.
    #[error("package {0} is not the latest run of its object")]
    StalePackage(String),

    #[error("package {sip_filename} is not {required}")]
    InvalidPackageState {
        sip_filename: String,
        required: &'static str,
    },

    #[error("Package {0} already uploaded")]
    AlreadyUploaded(String),

    /// Operator freeze refused because workers are busy with these objects.
    #[error(
        "The following object IDs have running jobs and can't be frozen: {}",
        join_ids(.0)
    )]
    JobsRunning(Vec<i64>),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("object {object_id} can't be re-enqueued: {reason}")]
    NotReenqueueable { object_id: i64, reason: String },

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("toolkit error: {0}")]
    Toolkit(#[from] ToolkitError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("{stage} job timed out after {secs} seconds")]
    Timeout { stage: Stage, secs: u64 },
}

impl WorkflowError {
    /// Infrastructure failures that leave the object untouched and may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(_) | Self::Queue(_) | Self::Archive(_) | Self::Timeout { .. } => true,
            Self::Toolkit(e) => !e.is_domain(),
            _ => false,
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ObjectNotFound(id) => Self::ObjectNotFound(id),
            StoreError::PackageNotFound(what) => Self::PackageNotFound(what),
            StoreError::DuplicatePackage { filename } => Self::DuplicatePackage { filename },
            StoreError::ObjectFrozen(id) => Self::ObjectFrozen(id),
            StoreError::PackageCancelled(filename) => Self::PackageCancelled(filename),
            StoreError::StalePackage(filename) => Self::StalePackage(filename),
            StoreError::InvalidPackageState {
                sip_filename,
                required,
            } => Self::InvalidPackageState {
                sip_filename,
                required,
            },
            e @ StoreError::Database(_) => Self::Store(e),
        }
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
