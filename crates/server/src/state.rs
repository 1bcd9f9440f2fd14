use std::sync::Arc;

use archivist_core::{
    AuditHandle, AuditStore, Config, JobQueue, SanitizedConfig, WorkerPool, Workflow,
    WorkflowStore,
};

/// Shared application state
pub struct AppState {
    config: Config,
    workflow: Arc<Workflow>,
    audit: AuditHandle,
    audit_store: Arc<dyn AuditStore>,
    workers: Option<Arc<WorkerPool>>,
}

impl AppState {
    pub fn new(
        config: Config,
        workflow: Arc<Workflow>,
        audit: AuditHandle,
        audit_store: Arc<dyn AuditStore>,
        workers: Option<Arc<WorkerPool>>,
    ) -> Self {
        Self {
            config,
            workflow,
            audit,
            audit_store,
            workers,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn store(&self) -> &dyn WorkflowStore {
        self.workflow.store().as_ref()
    }

    pub fn queue(&self) -> &dyn JobQueue {
        self.workflow.dispatcher().queue().as_ref()
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    /// The worker pool, when background workers are enabled.
    pub fn workers(&self) -> Option<&Arc<WorkerPool>> {
        self.workers.as_ref()
    }
}
