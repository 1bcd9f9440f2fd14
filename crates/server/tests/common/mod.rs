//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with the preservation toolkit and the archive replaced by mocks, so the
//! whole operator surface can be exercised without external tools.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use archivist_core::testing::{FixedClock, MockArchiveClient, MockToolkit};
use archivist_core::{
    create_audit_system, AuditFilter, AuditStore, Config, Dispatcher, SqliteAuditStore,
    SqliteJobQueue, SqliteWorkflowStore, WorkerPool, WorkerSettings, Workflow, WorkflowSettings,
    WorkflowStore,
};
use archivist_server::state::AppState;

/// Re-export fixtures for test convenience
pub use archivist_core::testing::fixtures;

/// Test fixture for API testing with mock collaborators.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_enqueue() {
///     let fixture = TestFixture::new().await;
///     fixture.add_object(1);
///
///     let response = fixture.post("/api/v1/objects/enqueue", json!({})).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Workflow behind the router, for driving stages directly
    pub workflow: Arc<Workflow>,
    pub store: Arc<SqliteWorkflowStore>,
    pub queue: Arc<SqliteJobQueue>,
    pub audit_store: Arc<SqliteAuditStore>,
    /// Mock toolkit - inject preservation errors
    pub toolkit: Arc<MockToolkit>,
    /// Mock archive - publish ingest reports
    pub archive: Arc<MockArchiveClient>,
    pub clock: Arc<FixedClock>,
    /// Temporary directory for the database and package directories
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture without a worker pool.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = Config::default();
        config.database.path = Some(db_path.clone());
        config.package.package_dir = temp_dir.path().join("packages");
        config.package.archive_dir = temp_dir.path().join("archive");
        config.archive.processed_dir = temp_dir.path().join("processed");
        config.workers.enabled = test_config.enable_workers;

        // Stores share one database file, as in production
        let store =
            Arc::new(SqliteWorkflowStore::new(&db_path).expect("Failed to create workflow store"));
        let queue = Arc::new(SqliteJobQueue::new(&db_path).expect("Failed to create job queue"));
        let audit_store =
            Arc::new(SqliteAuditStore::new(&db_path).expect("Failed to create audit store"));

        let toolkit = Arc::new(MockToolkit::new());
        let archive = Arc::new(MockArchiveClient::new());
        let clock = Arc::new(FixedClock::new(fixtures::test_date()));

        // Create audit system
        let (audit_handle, audit_writer) =
            create_audit_system(Arc::clone(&audit_store) as Arc<dyn AuditStore>, 100);

        // Spawn audit writer
        tokio::spawn(audit_writer.run());

        let workflow = Arc::new(
            Workflow::new(
                store.clone(),
                Dispatcher::new(queue.clone()),
                toolkit.clone(),
                archive.clone(),
                WorkflowSettings::from(&config),
            )
            .with_clock(clock.clone())
            .with_audit(audit_handle.clone()),
        );

        // The pool is never started: status reporting is all the API needs
        let workers = test_config.enable_workers.then(|| {
            Arc::new(WorkerPool::new(
                WorkerSettings::from(&config),
                Arc::clone(&workflow),
                Some(audit_handle.clone()),
            ))
        });

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&workflow),
            audit_handle,
            audit_store.clone(),
            workers,
        ));

        let router = archivist_server::api::create_router(state);

        Self {
            router,
            workflow,
            store,
            queue,
            audit_store,
            toolkit,
            archive,
            clock,
            temp_dir,
        }
    }

    /// Insert a fixture object eligible for preservation.
    pub fn add_object(&self, id: i64) {
        self.store
            .upsert_object(&fixtures::object_snapshot(id))
            .expect("Failed to add object");
    }

    /// Run download, packaging and upload of one object; returns the SIP id.
    pub async fn upload(&self, object_id: i64) -> String {
        self.workflow
            .download_object(object_id, None)
            .await
            .expect("download failed");
        let package = self
            .store
            .latest_package(object_id)
            .unwrap()
            .expect("package should exist");
        self.workflow
            .create_sip(object_id, &package.sip_id)
            .await
            .expect("create_sip failed");
        self.workflow
            .submit_sip(object_id, &package.sip_id)
            .await
            .expect("submit failed");
        package.sip_id
    }

    /// Wait until at least `count` audit events of a type were written.
    pub async fn wait_for_audit(&self, event_type: &str, count: i64) {
        let filter = AuditFilter::of_type(event_type);
        for _ in 0..100 {
            if self.audit_store.count(&filter).unwrap() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Timed out waiting for {} audit event(s) of type {}", count, event_type);
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, String::from_utf8_lossy(&body_bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Attach an (unstarted) worker pool to the app state
    pub enable_workers: bool,
}

impl TestConfig {
    /// Create config with a worker pool attached.
    pub fn with_workers() -> Self {
        Self {
            enable_workers: true,
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
