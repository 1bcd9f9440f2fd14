//! Mock preservation toolkit for testing.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::model::PreservationStatus;
use crate::toolkit::{DownloadedObject, PreservationToolkit, SipDates, ToolkitError};

/// A recorded toolkit call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolkitCall {
    Download {
        object_id: i64,
        sip_id: String,
    },
    CreateSip {
        object_id: i64,
        sip_id: String,
        dates: SipDates,
    },
    Submit {
        object_id: i64,
        sip_id: String,
    },
    Confirm {
        object_id: i64,
        sip_id: String,
        status: PreservationStatus,
    },
}

/// Mock implementation of the PreservationToolkit trait.
///
/// Provides controllable behavior for testing:
/// - Record every call for assertions
/// - Create the object's working directory on download
/// - Simulate preservation and infrastructure errors
///
/// # Example
///
/// ```rust,ignore
/// let toolkit = MockToolkit::new();
/// toolkit
///     .set_next_error(ToolkitError::preservation("Mock error", "Filename was not supported"))
///     .await;
///
/// // The next call fails, later calls succeed again
/// let calls = toolkit.calls().await;
/// ```
#[derive(Debug)]
pub struct MockToolkit {
    /// Recorded calls, oldest first.
    calls: Arc<RwLock<Vec<ToolkitCall>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<ToolkitError>>>,
    /// Name packages `{object_id}-{sip_id}.tar` instead of `fake_package-{sip_id}.tar`.
    per_object_filenames: bool,
    /// Source-system modification date reported by downloads.
    modified_date: Option<DateTime<Utc>>,
    /// Filename reported by downloads instead of [`PreservationToolkit::sip_filename`].
    reported_filename: Option<String>,
    /// Simulated duration of every call.
    call_duration: Arc<RwLock<Duration>>,
}

impl Default for MockToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl MockToolkit {
    /// Create a new mock toolkit producing `fake_package-{sip_id}.tar` packages.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            per_object_filenames: false,
            modified_date: Some(super::fixtures::modified_date()),
            reported_filename: None,
            call_duration: Arc::new(RwLock::new(Duration::ZERO)),
        }
    }

    /// Include the object id in package filenames, so several objects can be
    /// downloaded within the same second.
    pub fn per_object_filenames(mut self) -> Self {
        self.per_object_filenames = true;
        self
    }

    /// Report this modification date from downloads.
    pub fn with_modified_date(mut self, modified_date: Option<DateTime<Utc>>) -> Self {
        self.modified_date = modified_date;
        self
    }

    /// Report this package filename from downloads, whatever the run.
    pub fn with_reported_filename(mut self, filename: impl Into<String>) -> Self {
        self.reported_filename = Some(filename.into());
        self
    }

    /// Get all recorded calls.
    pub async fn calls(&self) -> Vec<ToolkitCall> {
        self.calls.read().await.clone()
    }

    /// Clear recorded calls.
    pub async fn clear_recorded(&self) {
        self.calls.write().await.clear();
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: ToolkitError) {
        *self.next_error.write().await = Some(error);
    }

    /// Clear any pending error.
    pub async fn clear_next_error(&self) {
        *self.next_error.write().await = None;
    }

    /// Make every call take this long.
    pub async fn set_call_duration(&self, duration: Duration) {
        *self.call_duration.write().await = duration;
    }

    /// Record a call and take the next error if set.
    async fn record(&self, call: ToolkitCall) -> Result<(), ToolkitError> {
        self.calls.write().await.push(call);
        let duration = *self.call_duration.read().await;
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
        match self.next_error.write().await.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PreservationToolkit for MockToolkit {
    fn name(&self) -> &str {
        "mock"
    }

    fn sip_filename(&self, object_id: i64, sip_id: &str) -> String {
        if self.per_object_filenames {
            format!("{}-{}.tar", object_id, sip_id)
        } else {
            format!("fake_package-{}.tar", sip_id)
        }
    }

    async fn download_object(
        &self,
        object_id: i64,
        package_dir: &Path,
        sip_id: &str,
    ) -> Result<DownloadedObject, ToolkitError> {
        // Partial download left behind when the call fails
        let object_dir = package_dir.join(object_id.to_string());
        tokio::fs::create_dir_all(&object_dir).await?;
        tokio::fs::write(object_dir.join("Object.xml"), b"<Object/>").await?;

        self.record(ToolkitCall::Download {
            object_id,
            sip_id: sip_id.to_string(),
        })
        .await?;

        Ok(DownloadedObject {
            sip_filename: self
                .reported_filename
                .clone()
                .unwrap_or_else(|| self.sip_filename(object_id, sip_id)),
            modified_date: self.modified_date,
            attachment_ids: vec![object_id * 10, object_id * 20],
        })
    }

    async fn create_sip(
        &self,
        object_id: i64,
        _package_dir: &Path,
        sip_id: &str,
        dates: SipDates,
    ) -> Result<(), ToolkitError> {
        self.record(ToolkitCall::CreateSip {
            object_id,
            sip_id: sip_id.to_string(),
            dates,
        })
        .await
    }

    async fn submit_sip(
        &self,
        object_id: i64,
        _package_dir: &Path,
        sip_id: &str,
    ) -> Result<(), ToolkitError> {
        self.record(ToolkitCall::Submit {
            object_id,
            sip_id: sip_id.to_string(),
        })
        .await
    }

    async fn confirm_sip(
        &self,
        object_id: i64,
        _package_dir: &Path,
        _archive_dir: &Path,
        sip_id: &str,
        status: PreservationStatus,
    ) -> Result<(), ToolkitError> {
        self.record(ToolkitCall::Confirm {
            object_id,
            sip_id: sip_id.to_string(),
            status,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_download_creates_working_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let toolkit = MockToolkit::new();

        let downloaded = toolkit
            .download_object(123456, temp_dir.path(), "20190203-120000")
            .await
            .unwrap();

        assert_eq!(downloaded.sip_filename, "fake_package-20190203-120000.tar");
        assert_eq!(downloaded.attachment_ids, vec![1234560, 2469120]);
        assert!(temp_dir.path().join("123456").join("Object.xml").exists());
    }

    #[tokio::test]
    async fn test_next_error_applies_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let toolkit = MockToolkit::new().per_object_filenames();
        toolkit
            .set_next_error(ToolkitError::preservation("detail", "Filename was not supported"))
            .await;

        let err = toolkit
            .download_object(1, temp_dir.path(), "20190203-120000")
            .await
            .unwrap_err();
        assert!(err.is_domain());

        let downloaded = toolkit
            .download_object(1, temp_dir.path(), "20190203-120001")
            .await
            .unwrap();
        assert_eq!(downloaded.sip_filename, "1-20190203-120001.tar");
        assert_eq!(toolkit.calls().await.len(), 2);
    }
}
