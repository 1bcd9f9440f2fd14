//! Testing utilities and mock implementations for workflow tests.
//!
//! This module provides mock implementations of the external collaborator
//! traits, so the whole pipeline can be driven without a real toolkit or
//! archive.
//!
//! # Example
//!
//! ```rust,ignore
//! use archivist_core::testing::{fixtures, FixedClock, MockArchiveClient, MockToolkit};
//!
//! let toolkit = MockToolkit::new();
//! let archive = MockArchiveClient::new();
//! let clock = FixedClock::new(fixtures::test_date());
//!
//! // Configure mock responses
//! toolkit.set_next_error(ToolkitError::preservation("Mock error", "Filename was not supported")).await;
//! clock.advance(chrono::Duration::seconds(1));
//!
//! // Use in Workflow::new(...).with_clock(...)
//! ```

mod fixed_clock;
mod mock_archive;
mod mock_toolkit;

pub use fixed_clock::FixedClock;
pub use mock_archive::MockArchiveClient;
pub use mock_toolkit::{MockToolkit, ToolkitCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::PathBuf;

    use chrono::{DateTime, TimeZone, Utc};

    use crate::archive::ProcessedSip;
    use crate::model::{MuseumObject, MuseumPackage, NewPackage, ObjectSnapshot, PreservationStatus};

    /// 2019-02-03 12:00:00 UTC.
    pub fn test_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 2, 3, 12, 0, 0).unwrap()
    }

    /// Creation date of fixture objects.
    pub fn created_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap()
    }

    /// Source-system modification date of fixture objects.
    pub fn modified_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 6, 1, 0, 0, 0).unwrap()
    }

    /// Source data of an object ready for preservation.
    pub fn object_snapshot(id: i64) -> ObjectSnapshot {
        ObjectSnapshot {
            id,
            title: Some(format!("Object {}", id)),
            created_date: Some(created_date()),
            modified_date: Some(modified_date()),
            metadata_hash: Some(format!("metadata-hash-{}", id)),
            attachment_metadata_hash: Some(format!("attachment-hash-{}", id)),
        }
    }

    /// An active object that was never preserved.
    pub fn museum_object(id: i64) -> MuseumObject {
        let snapshot = object_snapshot(id);
        MuseumObject {
            id,
            title: snapshot.title,
            created_date: snapshot.created_date,
            modified_date: snapshot.modified_date,
            metadata_hash: snapshot.metadata_hash,
            attachment_metadata_hash: snapshot.attachment_metadata_hash,
            preserved: false,
            freeze: None,
            latest_package_id: None,
        }
    }

    /// A finished download of `object_id` named `{object_id}-{sip_id}.tar`.
    pub fn new_package(object_id: i64, sip_id: &str) -> NewPackage {
        NewPackage {
            museum_object_id: object_id,
            sip_id: sip_id.to_string(),
            sip_filename: format!("{}-{}.tar", object_id, sip_id),
            object_modified_date: Some(modified_date()),
            attachment_ids: vec![object_id * 10, object_id * 20],
            created_date: test_date(),
        }
    }

    /// A downloaded package row, as the store would return it.
    pub fn museum_package(object_id: i64, sip_id: &str) -> MuseumPackage {
        let snapshot = object_snapshot(object_id);
        MuseumPackage {
            id: 1,
            museum_object_id: object_id,
            sip_filename: format!("{}-{}.tar", object_id, sip_id),
            sip_id: sip_id.to_string(),
            object_modified_date: snapshot.modified_date,
            created_date: test_date(),
            metadata_hash: snapshot.metadata_hash,
            attachment_metadata_hash: snapshot.attachment_metadata_hash,
            downloaded: true,
            packaged: false,
            uploaded: false,
            preserved: false,
            rejected: false,
            cancelled: false,
        }
    }

    /// An ingest report for `sip_filename`.
    pub fn processed_sip(
        sip_filename: &str,
        status: PreservationStatus,
        report_time: DateTime<Utc>,
    ) -> ProcessedSip {
        ProcessedSip {
            sip_filename: sip_filename.to_string(),
            status,
            report_time,
            report_path: PathBuf::from(format!(
                "{}/{}/{}/{}-ingest-report.xml",
                status.as_str(),
                report_time.format("%Y-%m-%d"),
                sip_filename,
                sip_filename
            )),
        }
    }
}
