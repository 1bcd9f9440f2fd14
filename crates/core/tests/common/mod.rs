//! Shared harness for workflow integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use archivist_core::config::WorkersConfig;
use archivist_core::model::{MuseumObject, PreservationDelays};
use archivist_core::testing::{fixtures, FixedClock, MockArchiveClient, MockToolkit};
use archivist_core::workflow::WorkflowSettings;
use archivist_core::{
    Dispatcher, Job, JobQueue, SqliteJobQueue, SqliteWorkflowStore, Stage, WorkerPool,
    WorkerSettings, Workflow, WorkflowStore,
};

/// Test helper wiring a workflow to in-memory stores and mocks.
pub struct TestHarness {
    pub store: Arc<SqliteWorkflowStore>,
    pub queue: Arc<SqliteJobQueue>,
    pub toolkit: Arc<MockToolkit>,
    pub archive: Arc<MockArchiveClient>,
    pub clock: Arc<FixedClock>,
    pub workflow: Workflow,
    temp_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_toolkit(MockToolkit::new())
    }

    pub fn with_toolkit(toolkit: MockToolkit) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(SqliteWorkflowStore::in_memory().expect("Failed to create store"));
        let queue = Arc::new(SqliteJobQueue::in_memory().expect("Failed to create queue"));
        let toolkit = Arc::new(toolkit);
        let archive = Arc::new(MockArchiveClient::new());
        let clock = Arc::new(FixedClock::new(fixtures::test_date()));

        let settings = WorkflowSettings {
            package_dir: temp_dir.path().join("packages"),
            archive_dir: temp_dir.path().join("archive"),
            delays: PreservationDelays::from_secs(30 * 86_400, 30 * 86_400),
            sync_days: 31,
        };

        let workflow = Workflow::new(
            store.clone(),
            Dispatcher::new(queue.clone()),
            toolkit.clone(),
            archive.clone(),
            settings,
        )
        .with_clock(clock.clone());

        Self {
            store,
            queue,
            toolkit,
            archive,
            clock,
            workflow,
            temp_dir,
        }
    }

    /// Insert a fixture object eligible for preservation.
    pub fn add_object(&self, id: i64) -> MuseumObject {
        self.store
            .upsert_object(&fixtures::object_snapshot(id))
            .expect("Failed to add object")
    }

    pub fn object(&self, id: i64) -> MuseumObject {
        self.store
            .get_object(id)
            .unwrap()
            .expect("object should exist")
    }

    pub fn package_dir(&self) -> PathBuf {
        self.temp_dir.path().join("packages")
    }

    /// Working directory of an object.
    pub fn object_dir(&self, id: i64) -> PathBuf {
        self.package_dir().join(id.to_string())
    }

    /// Jobs of a stage in any state.
    pub async fn jobs(&self, stage: Stage) -> Vec<Job> {
        self.queue.list(Some(stage), None, 100).await.unwrap()
    }

    pub async fn all_jobs(&self) -> Vec<Job> {
        self.queue.list(None, None, 100).await.unwrap()
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            workers: WorkersConfig {
                enabled: true,
                download: 1,
                package: 1,
                submit: 1,
                confirm: 1,
                enqueue_objects: 1,
            },
            poll_interval: Duration::from_millis(10),
            job_timeout: Duration::from_secs(5),
            max_attempts: 2,
            retry_delay: Duration::from_secs(60),
            sync_interval: None,
            sync_days: 31,
            shutdown_grace: Duration::from_secs(1),
        }
    }

    pub fn worker_pool(&self, settings: WorkerSettings) -> WorkerPool {
        WorkerPool::new(settings, Arc::new(self.workflow.clone()), None)
    }
}
