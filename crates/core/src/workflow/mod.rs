//! Stage handlers, freeze policy and operator actions.
//!
//! A [`Workflow`] owns handles to every collaborator a stage needs. Handlers
//! read state, call the toolkit outside any transaction, commit the result in
//! one store call and then enqueue the next stage.

mod clock;
mod error;
mod freeze;
mod operator;
mod stages;

pub use clock::{sip_id_at, Clock, SystemClock};
pub use error::WorkflowError;
pub use operator::{FreezeRequest, SyncReport, UnfreezeRequest};
pub use stages::DEFAULT_ENQUEUE_COUNT;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::archive::ArchiveClient;
use crate::audit::{AuditEvent, AuditHandle};
use crate::config::Config;
use crate::model::PreservationDelays;
use crate::queue::{Dispatcher, JobHandle, JobPayload};
use crate::store::WorkflowStore;
use crate::toolkit::PreservationToolkit;

/// Filesystem locations and timing used by the handlers.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub package_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub delays: PreservationDelays,
    pub sync_days: u32,
}

impl From<&Config> for WorkflowSettings {
    fn from(config: &Config) -> Self {
        Self {
            package_dir: config.package.package_dir.clone(),
            archive_dir: config.package.archive_dir.clone(),
            delays: PreservationDelays::from(&config.package),
            sync_days: config.archive.sync_days,
        }
    }
}

/// Result of a successfully handled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    /// State committed; `next` is the follow-up job, if the stage has one.
    Completed { next: Option<JobHandle> },
    /// The bulk enqueuer submitted this many downloads.
    Enqueued { count: usize },
    /// The toolkit rejected the object and it was frozen.
    Frozen { reason: String },
}

/// Coordinates the preservation pipeline.
#[derive(Clone)]
pub struct Workflow {
    store: Arc<dyn WorkflowStore>,
    dispatcher: Dispatcher,
    toolkit: Arc<dyn PreservationToolkit>,
    archive: Arc<dyn ArchiveClient>,
    clock: Arc<dyn Clock>,
    settings: WorkflowSettings,
    audit: Option<AuditHandle>,
}

impl Workflow {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        dispatcher: Dispatcher,
        toolkit: Arc<dyn PreservationToolkit>,
        archive: Arc<dyn ArchiveClient>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            store,
            dispatcher,
            toolkit,
            archive,
            clock: Arc::new(SystemClock),
            settings,
            audit: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Execute a job payload with the handler of its stage.
    pub async fn run_job(&self, payload: &JobPayload) -> Result<StageOutcome, WorkflowError> {
        match payload {
            JobPayload::Download { object_id, sip_id } => {
                self.download_object(*object_id, sip_id.clone()).await
            }
            JobPayload::Package { object_id, sip_id } => self.create_sip(*object_id, sip_id).await,
            JobPayload::Submit { object_id, sip_id } => self.submit_sip(*object_id, sip_id).await,
            JobPayload::Confirm {
                object_id,
                sip_id,
                status,
            } => self.confirm_sip(*object_id, sip_id, *status).await,
            JobPayload::EnqueueObjects { request } => self.enqueue_objects(request).await,
        }
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }

    fn object_dir(&self, object_id: i64) -> PathBuf {
        self.settings.package_dir.join(object_id.to_string())
    }
}

/// Delete an object's working directory. A missing directory is not an error.
async fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
