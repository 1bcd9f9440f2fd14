//! Download stage integration tests.
//!
//! Covers run naming, filename uniqueness, chaining to the package stage and
//! the automatic freeze on preservation errors.

mod common;

use chrono::{Duration, TimeZone, Utc};

use archivist_core::model::{FreezeCode, FreezeSource, PreservationStatus};
use archivist_core::testing::{MockToolkit, ToolkitCall};
use archivist_core::{
    Dispatcher, Freeze, JobPayload, Stage, StageOutcome, ToolkitError, WorkflowError,
    WorkflowStore,
};

use common::TestHarness;

const OBJECT_ID: i64 = 123456;

#[tokio::test]
async fn test_download_creates_package_and_enqueues_packaging() {
    let harness = TestHarness::new();
    harness.add_object(OBJECT_ID);

    let outcome = harness
        .workflow
        .download_object(OBJECT_ID, None)
        .await
        .unwrap();

    let next = match outcome {
        StageOutcome::Completed { next: Some(next) } => next,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(next.job_id.as_str(), "package_123456");
    assert_eq!(next.stage, Stage::Package);
    assert!(next.accepted);

    let package = harness
        .store
        .package_by_filename("fake_package-20190203-120000.tar")
        .unwrap()
        .expect("package should exist");
    assert_eq!(package.sip_id, "20190203-120000");
    assert!(package.downloaded);
    assert!(!package.packaged);
    assert!(!package.preserved);
    assert_eq!(package.metadata_hash.as_deref(), Some("metadata-hash-123456"));
    assert_eq!(
        harness.store.package_attachments(package.id).unwrap().len(),
        2
    );

    let object = harness.object(OBJECT_ID);
    assert_eq!(object.latest_package_id, Some(package.id));

    let jobs = harness.jobs(Stage::Package).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(
        jobs[0].payload,
        JobPayload::Package {
            object_id: OBJECT_ID,
            sip_id: "20190203-120000".to_string(),
        }
    );
}

#[tokio::test]
async fn test_second_download_later_creates_newer_latest_package() {
    let harness = TestHarness::new();
    harness.add_object(OBJECT_ID);

    harness
        .workflow
        .download_object(OBJECT_ID, None)
        .await
        .unwrap();

    harness
        .clock
        .set(Utc.with_ymd_and_hms(2019, 2, 3, 13, 15, 15).unwrap());
    harness
        .workflow
        .download_object(OBJECT_ID, None)
        .await
        .unwrap();

    let packages = harness.store.list_packages(OBJECT_ID).unwrap();
    assert_eq!(packages.len(), 2);
    assert_eq!(packages[1].sip_filename, "fake_package-20190203-131515.tar");

    let latest = harness.store.latest_package(OBJECT_ID).unwrap().unwrap();
    assert_eq!(latest.sip_id, "20190203-131515");

    // The queued packaging job now belongs to the newer run
    let jobs = harness.jobs(Stage::Package).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(
        jobs[0].payload,
        JobPayload::Package {
            object_id: OBJECT_ID,
            sip_id: "20190203-131515".to_string(),
        }
    );

    let pool = harness.worker_pool(harness.worker_settings());
    let report = pool.run_next(Stage::Package).await.unwrap().unwrap();
    assert_eq!(report.result.label(), "completed");

    let first = harness
        .store
        .get_package(OBJECT_ID, "20190203-120000")
        .unwrap()
        .unwrap();
    let second = harness
        .store
        .get_package(OBJECT_ID, "20190203-131515")
        .unwrap()
        .unwrap();
    assert!(!first.packaged);
    assert!(second.packaged);
}

#[tokio::test]
async fn test_superseded_run_does_not_progress() {
    let harness = TestHarness::new();
    harness.add_object(OBJECT_ID);

    harness
        .workflow
        .download_object(OBJECT_ID, None)
        .await
        .unwrap();
    harness
        .clock
        .set(Utc.with_ymd_and_hms(2019, 2, 3, 13, 15, 15).unwrap());
    harness
        .workflow
        .download_object(OBJECT_ID, None)
        .await
        .unwrap();
    harness.toolkit.clear_recorded().await;

    let err = harness
        .workflow
        .create_sip(OBJECT_ID, "20190203-120000")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::StalePackage(ref filename) if filename == "fake_package-20190203-120000.tar"
    ));
    assert!(!err.is_retryable());
    assert!(harness.toolkit.calls().await.is_empty());
}

#[tokio::test]
async fn test_download_reporting_unexpected_filename_records_nothing() {
    let harness =
        TestHarness::with_toolkit(MockToolkit::new().with_reported_filename("renamed.tar"));
    harness.add_object(OBJECT_ID);

    let err = harness
        .workflow
        .download_object(OBJECT_ID, None)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Toolkit(ToolkitError::Unavailable(_))));
    assert!(err.is_retryable());
    assert!(err.to_string().contains("renamed.tar"));
    assert!(harness.store.list_packages(OBJECT_ID).unwrap().is_empty());
    assert_eq!(harness.object(OBJECT_ID).latest_package_id, None);
    assert!(harness.all_jobs().await.is_empty());
}

#[tokio::test]
async fn test_download_twice_in_same_second_is_duplicate() {
    let harness = TestHarness::new();
    harness.add_object(OBJECT_ID);

    harness
        .workflow
        .download_object(OBJECT_ID, None)
        .await
        .unwrap();
    let object_before = harness.object(OBJECT_ID);

    let err = harness
        .workflow
        .download_object(OBJECT_ID, None)
        .await
        .unwrap_err();

    match err {
        WorkflowError::DuplicatePackage { ref filename } => {
            assert_eq!(filename, "fake_package-20190203-120000.tar")
        }
        ref other => panic!("unexpected error: {:?}", other),
    }
    assert!(!err.is_retryable());
    assert_eq!(
        err.to_string(),
        "Package with filename fake_package-20190203-120000.tar already exists"
    );

    assert_eq!(harness.store.list_packages(OBJECT_ID).unwrap().len(), 1);
    assert_eq!(harness.object(OBJECT_ID), object_before);
    // The toolkit is not asked to download a run that cannot be recorded
    assert_eq!(harness.toolkit.calls().await.len(), 1);
}

#[tokio::test]
async fn test_preservation_error_freezes_and_keeps_preserved_package() {
    let harness = TestHarness::new();
    harness.add_object(OBJECT_ID);

    // An earlier run that was accepted by the archive
    let preserved = harness
        .store
        .record_download(&archivist_core::testing::fixtures::new_package(
            OBJECT_ID,
            "20190101-000000",
        ))
        .unwrap();
    harness.store.mark_packaged(preserved.id).unwrap();
    harness.store.mark_uploaded(preserved.id).unwrap();
    let preserved = harness
        .store
        .mark_confirmed(preserved.id, PreservationStatus::Accepted)
        .unwrap();

    harness
        .toolkit
        .set_next_error(ToolkitError::preservation(
            "Mock detailed error message",
            "Filename was not supported",
        ))
        .await;

    let outcome = harness
        .workflow
        .download_object(OBJECT_ID, None)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        StageOutcome::Frozen {
            reason: "Filename was not supported".to_string()
        }
    );

    let object = harness.object(OBJECT_ID);
    let freeze = object.freeze.expect("object should be frozen");
    assert_eq!(freeze.reason, "Filename was not supported");
    assert_eq!(freeze.source, FreezeSource::Automatic);
    assert_eq!(freeze.code, FreezeCode::PreservationError);
    assert!(object.preserved);
    assert_eq!(object.latest_package_id, Some(preserved.id));

    let packages = harness.store.list_packages(OBJECT_ID).unwrap();
    assert_eq!(packages, vec![preserved]);

    assert!(harness.all_jobs().await.is_empty());
    assert!(!harness.object_dir(OBJECT_ID).exists());
}

#[tokio::test]
async fn test_preservation_error_without_previous_package() {
    let harness = TestHarness::new();
    harness.add_object(OBJECT_ID);
    harness
        .toolkit
        .set_next_error(ToolkitError::preservation("detail", "Unsupported file type"))
        .await;

    harness
        .workflow
        .download_object(OBJECT_ID, None)
        .await
        .unwrap();

    let object = harness.object(OBJECT_ID);
    assert!(object.is_frozen());
    assert!(object.latest_package_id.is_none());
    assert!(harness.store.list_packages(OBJECT_ID).unwrap().is_empty());
}

#[tokio::test]
async fn test_infrastructure_error_changes_nothing() {
    let harness = TestHarness::new();
    harness.add_object(OBJECT_ID);
    let object_before = harness.object(OBJECT_ID);
    harness
        .toolkit
        .set_next_error(ToolkitError::Unavailable("connection refused".to_string()))
        .await;

    let err = harness
        .workflow
        .download_object(OBJECT_ID, None)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Toolkit(_)));
    assert!(err.is_retryable());
    assert_eq!(harness.object(OBJECT_ID), object_before);
    assert!(harness.store.list_packages(OBJECT_ID).unwrap().is_empty());
    assert!(harness.all_jobs().await.is_empty());
}

#[tokio::test]
async fn test_frozen_object_is_refused() {
    let harness = TestHarness::new();
    harness.add_object(OBJECT_ID);
    harness
        .store
        .freeze_object(OBJECT_ID, &Freeze::manual("on hold"))
        .unwrap();

    let err = harness
        .workflow
        .download_object(OBJECT_ID, None)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::ObjectFrozen(OBJECT_ID)));
    assert!(!err.is_retryable());
    assert!(harness.toolkit.calls().await.is_empty());
}

#[tokio::test]
async fn test_unknown_object() {
    let harness = TestHarness::new();

    let err = harness.workflow.download_object(42, None).await.unwrap_err();
    assert!(matches!(err, WorkflowError::ObjectNotFound(42)));
}

#[tokio::test]
async fn test_explicit_sip_id_is_used() {
    let harness = TestHarness::new();
    harness.add_object(OBJECT_ID);

    harness
        .workflow
        .download_object(OBJECT_ID, Some("manual-run".to_string()))
        .await
        .unwrap();

    let calls = harness.toolkit.calls().await;
    assert_eq!(
        calls,
        vec![ToolkitCall::Download {
            object_id: OBJECT_ID,
            sip_id: "manual-run".to_string(),
        }]
    );
    assert!(harness
        .store
        .get_package(OBJECT_ID, "manual-run")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_filenames_unique_across_objects() {
    let harness = TestHarness::new();
    harness.add_object(1);
    harness.add_object(2);

    harness.workflow.download_object(1, None).await.unwrap();
    let err = harness.workflow.download_object(2, None).await.unwrap_err();
    assert!(matches!(err, WorkflowError::DuplicatePackage { .. }));

    let harness = TestHarness::with_toolkit(MockToolkit::new().per_object_filenames());
    harness.add_object(1);
    harness.add_object(2);

    harness.workflow.download_object(1, None).await.unwrap();
    harness.workflow.download_object(2, None).await.unwrap();

    let first = harness.store.latest_package(1).unwrap().unwrap();
    let second = harness.store.latest_package(2).unwrap().unwrap();
    assert_eq!(first.sip_filename, "1-20190203-120000.tar");
    assert_eq!(second.sip_filename, "2-20190203-120000.tar");
}

#[tokio::test]
async fn test_same_stage_enqueued_twice_runs_once() {
    let harness = TestHarness::new();
    harness.add_object(OBJECT_ID);
    let dispatcher = Dispatcher::new(harness.queue.clone());

    let payload = JobPayload::Download {
        object_id: OBJECT_ID,
        sip_id: Some("20190203-120000".to_string()),
    };
    let first = dispatcher.enqueue(payload.clone()).await.unwrap();
    let second = dispatcher.enqueue(payload).await.unwrap();

    assert!(first.accepted);
    assert!(!second.accepted);
    assert_eq!(first.job_id, second.job_id);

    let pool = harness.worker_pool(harness.worker_settings());
    assert!(pool.run_next(Stage::Download).await.unwrap().is_some());
    assert!(pool.run_next(Stage::Download).await.unwrap().is_none());
    assert_eq!(harness.store.list_packages(OBJECT_ID).unwrap().len(), 1);
}

#[tokio::test]
async fn test_package_created_date_follows_clock() {
    let harness = TestHarness::new();
    harness.add_object(OBJECT_ID);
    harness.clock.advance(Duration::hours(3));

    harness
        .workflow
        .download_object(OBJECT_ID, None)
        .await
        .unwrap();

    let package = harness.store.latest_package(OBJECT_ID).unwrap().unwrap();
    assert_eq!(package.sip_id, "20190203-150000");
    assert_eq!(
        package.created_date,
        Utc.with_ymd_and_hms(2019, 2, 3, 15, 0, 0).unwrap()
    );
}
