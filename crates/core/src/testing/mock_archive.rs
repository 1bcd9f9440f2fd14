//! Mock archive client for testing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::archive::{ArchiveClient, ArchiveError, ProcessedSip};
use crate::model::PreservationStatus;

/// Mock implementation of the ArchiveClient trait.
///
/// Holds a fixed list of reports per status. The `days` window is ignored;
/// the `skip` set is honoured like a real client would.
#[derive(Debug, Default)]
pub struct MockArchiveClient {
    reports: Arc<RwLock<HashMap<PreservationStatus, Vec<ProcessedSip>>>>,
    /// If set, the next call will fail with this error.
    next_error: Arc<RwLock<Option<ArchiveError>>>,
    /// Number of `processed_sips` calls made.
    call_count: Arc<RwLock<usize>>,
}

impl MockArchiveClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a report under its status.
    pub async fn add_report(&self, report: ProcessedSip) {
        self.reports
            .write()
            .await
            .entry(report.status)
            .or_default()
            .push(report);
    }

    /// Remove all reports.
    pub async fn clear_reports(&self) {
        self.reports.write().await.clear();
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: ArchiveError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn call_count(&self) -> usize {
        *self.call_count.read().await
    }
}

#[async_trait]
impl ArchiveClient for MockArchiveClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn processed_sips(
        &self,
        status: PreservationStatus,
        _days: u32,
        _now: DateTime<Utc>,
        skip: &HashSet<String>,
    ) -> Result<Vec<ProcessedSip>, ArchiveError> {
        *self.call_count.write().await += 1;
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        Ok(self
            .reports
            .read()
            .await
            .get(&status)
            .map(|reports| {
                reports
                    .iter()
                    .filter(|report| !skip.contains(&report.sip_filename))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
