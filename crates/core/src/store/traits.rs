//! Workflow store trait and request types.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{
    Freeze, Heartbeat, HeartbeatSource, MuseumAttachment, MuseumObject, MuseumPackage,
    NewPackage, ObjectSnapshot, PreservationDelays, PreservationStatus, SyncStatus,
};

use super::StoreError;

/// Result of freezing a batch of objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FreezeOutcome {
    /// Objects that now carry the freeze.
    pub frozen: Vec<i64>,
    /// Filenames of in-progress latest packages that were cancelled.
    pub cancelled_packages: Vec<String>,
}

/// Selects frozen objects to release.
#[derive(Debug, Clone, Default)]
pub struct UnfreezeFilter {
    /// Only objects frozen with exactly this reason.
    pub reason: Option<String>,
    /// Only these objects.
    pub object_ids: Option<Vec<i64>>,
}

impl UnfreezeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_object_ids(mut self, object_ids: Vec<i64>) -> Self {
        self.object_ids = Some(object_ids);
        self
    }

    /// At least one criterion is required so an empty request cannot release everything.
    pub fn is_empty(&self) -> bool {
        self.reason.is_none() && self.object_ids.as_ref().is_none_or(|ids| ids.is_empty())
    }
}

/// A latest package removed by [`WorkflowStore::reset_dangling_packages`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetPackage {
    pub object_id: i64,
    pub sip_filename: String,
}

/// Object totals for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ObjectCounts {
    pub total: i64,
    pub frozen: i64,
    pub preserved: i64,
}

/// Persistence of objects, packages and workflow bookkeeping.
///
/// Every mutating method commits in a single transaction and re-reads the
/// rows it guards on inside that transaction.
pub trait WorkflowStore: Send + Sync {
    /// Create or update an object from source-system data.
    /// Freeze state, `preserved` and `latest_package_id` are left untouched.
    fn upsert_object(&self, object: &ObjectSnapshot) -> Result<MuseumObject, StoreError>;

    /// Get an object by id.
    fn get_object(&self, id: i64) -> Result<Option<MuseumObject>, StoreError>;

    /// Get the package of a given run.
    fn get_package(&self, object_id: i64, sip_id: &str)
        -> Result<Option<MuseumPackage>, StoreError>;

    /// Get a package by its globally unique filename.
    fn package_by_filename(&self, sip_filename: &str) -> Result<Option<MuseumPackage>, StoreError>;

    /// The package referenced by the object's `latest_package_id`.
    fn latest_package(&self, object_id: i64) -> Result<Option<MuseumPackage>, StoreError>;

    /// All packages of an object, oldest first.
    fn list_packages(&self, object_id: i64) -> Result<Vec<MuseumPackage>, StoreError>;

    /// Attachments captured for a package.
    fn package_attachments(&self, package_id: i64) -> Result<Vec<MuseumAttachment>, StoreError>;

    /// Most recent package of the object accepted by the archive.
    fn last_preserved_package(&self, object_id: i64) -> Result<Option<MuseumPackage>, StoreError>;

    /// Commit a finished download: create the package with hashes copied from
    /// the object row, link attachments and point `latest_package_id` at it.
    fn record_download(&self, package: &NewPackage) -> Result<MuseumPackage, StoreError>;

    /// Flag a downloaded package as packaged.
    fn mark_packaged(&self, package_id: i64) -> Result<MuseumPackage, StoreError>;

    /// Flag a packaged package as uploaded.
    fn mark_uploaded(&self, package_id: i64) -> Result<MuseumPackage, StoreError>;

    /// Record the archive's verdict for an uploaded package.
    fn mark_confirmed(
        &self,
        package_id: i64,
        status: PreservationStatus,
    ) -> Result<MuseumPackage, StoreError>;

    /// Freeze a single object. Packages are not touched.
    fn freeze_object(&self, object_id: i64, freeze: &Freeze) -> Result<MuseumObject, StoreError>;

    /// Freeze objects and cancel their latest package unless it already finished.
    fn freeze_objects(&self, object_ids: &[i64], freeze: &Freeze)
        -> Result<FreezeOutcome, StoreError>;

    /// Clear the freeze of matching objects and detach a latest package that
    /// was never preserved. Returns the released object ids.
    fn unfreeze_objects(&self, filter: &UnfreezeFilter) -> Result<Vec<i64>, StoreError>;

    /// Detach the object's latest package.
    fn clear_latest_package(&self, object_id: i64) -> Result<(), StoreError>;

    /// Delete latest packages that were downloaded or packaged but never
    /// uploaded, detaching them from their objects. Objects in `skip` are left alone.
    fn reset_dangling_packages(
        &self,
        skip: &HashSet<i64>,
    ) -> Result<Vec<ResetPackage>, StoreError>;

    /// Ids of objects eligible for a new preservation run.
    fn pending_object_ids(
        &self,
        now: DateTime<Utc>,
        delays: PreservationDelays,
        random: bool,
    ) -> Result<Vec<i64>, StoreError>;

    /// Filenames of packages created since `since` that got a final verdict.
    fn confirmed_sip_filenames(&self, since: DateTime<Utc>) -> Result<HashSet<String>, StoreError>;

    /// Object totals.
    fn object_counts(&self) -> Result<ObjectCounts, StoreError>;

    /// Load a sync status, creating it and stamping `start_sync_date` when no run is in progress.
    fn sync_status(&self, name: &str, now: DateTime<Utc>) -> Result<SyncStatus, StoreError>;

    /// Persist the offset reached by the running sync.
    fn update_sync_offset(&self, name: &str, offset: i64) -> Result<(), StoreError>;

    /// Close the running sync so the next run resumes from its start date.
    fn finish_sync(&self, name: &str) -> Result<SyncStatus, StoreError>;

    /// Record that a background task is alive.
    fn submit_heartbeat(&self, source: HeartbeatSource, at: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Last heartbeat of every source that reported at least once.
    fn heartbeats(&self) -> Result<Vec<Heartbeat>, StoreError>;
}
