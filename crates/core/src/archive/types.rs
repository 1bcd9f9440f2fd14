//! Archive boundary types.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::PreservationStatus;

/// Errors raised while reading processed SIPs.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive could not be reached.
    #[error("archive unavailable: {0}")]
    Unavailable(String),

    /// Local filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An ingest report found in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedSip {
    pub sip_filename: String,
    pub status: PreservationStatus,
    /// Distinguishes repeated uploads of the same SIP; the newest wins.
    pub report_time: DateTime<Utc>,
    pub report_path: PathBuf,
}

/// Source of archive verdicts for submitted SIPs.
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// Returns the name of this client implementation.
    fn name(&self) -> &str;

    /// Reports with `status` from the last `days` days counted back from `now`.
    /// SIPs listed in `skip` are not looked at.
    async fn processed_sips(
        &self,
        status: PreservationStatus,
        days: u32,
        now: DateTime<Utc>,
        skip: &HashSet<String>,
    ) -> Result<Vec<ProcessedSip>, ArchiveError>;
}

/// Merge report lists keeping only the newest report per SIP filename.
///
/// First-seen order is preserved.
pub fn newest_per_filename(lists: Vec<Vec<ProcessedSip>>) -> Vec<ProcessedSip> {
    let mut results: Vec<ProcessedSip> = Vec::new();

    for sip in lists.into_iter().flatten() {
        match results
            .iter_mut()
            .find(|existing| existing.sip_filename == sip.sip_filename)
        {
            Some(existing) if sip.report_time > existing.report_time => *existing = sip,
            Some(_) => {}
            None => results.push(sip),
        }
    }

    results
}
