pub mod archive;
pub mod audit;
pub mod config;
pub mod metrics;
pub mod model;
pub mod queue;
pub mod store;
pub mod testing;
pub mod toolkit;
pub mod worker;
pub mod workflow;

pub use archive::{ArchiveClient, ArchiveError, DirectoryArchiveClient, ProcessedSip};
pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditFilter, AuditHandle, AuditPage, AuditRecord,
    AuditStore, AuditWriter, SqliteAuditStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use model::{
    Freeze, FreezeCode, FreezeSource, MuseumObject, MuseumPackage, ObjectSnapshot,
    PackageStatus, PreservationStatus,
};
pub use queue::{
    Dispatcher, EnqueueRequest, Job, JobHandle, JobId, JobPayload, JobQueue, JobState,
    QueueError, SqliteJobQueue, Stage, StageCounts,
};
pub use store::{SqliteWorkflowStore, StoreError, WorkflowStore};
pub use toolkit::{CommandToolkit, PreservationToolkit, ToolkitError};
pub use worker::{JobReport, JobResult, WorkerPool, WorkerSettings, WorkerStatus};
pub use workflow::{
    Clock, FreezeRequest, StageOutcome, SyncReport, SystemClock, UnfreezeRequest, Workflow,
    WorkflowError, WorkflowSettings,
};
