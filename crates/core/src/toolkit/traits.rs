//! Trait definitions for the preservation toolkit.

use std::path::Path;

use async_trait::async_trait;

use crate::model::PreservationStatus;

use super::error::ToolkitError;
use super::types::{DownloadedObject, SipDates};

/// External collaborator that does the actual preservation work.
///
/// Every call may block for a long time and must be made outside any store
/// transaction. Each object works in `package_dir/{object_id}`.
#[async_trait]
pub trait PreservationToolkit: Send + Sync {
    /// Returns the name of this toolkit implementation.
    fn name(&self) -> &str;

    /// Filename of the package a run will produce.
    ///
    /// `download_object` must report the same name.
    fn sip_filename(&self, object_id: i64, sip_id: &str) -> String {
        format!("{}-{}.tar", object_id, sip_id)
    }

    /// Fetch object metadata and attachments into the working directory.
    async fn download_object(
        &self,
        object_id: i64,
        package_dir: &Path,
        sip_id: &str,
    ) -> Result<DownloadedObject, ToolkitError>;

    /// Build the SIP from a downloaded object.
    async fn create_sip(
        &self,
        object_id: i64,
        package_dir: &Path,
        sip_id: &str,
        dates: SipDates,
    ) -> Result<(), ToolkitError>;

    /// Upload the SIP and remove the local archive file.
    async fn submit_sip(
        &self,
        object_id: i64,
        package_dir: &Path,
        sip_id: &str,
    ) -> Result<(), ToolkitError>;

    /// Archive logs of a processed SIP and clean up its working directory.
    async fn confirm_sip(
        &self,
        object_id: i64,
        package_dir: &Path,
        archive_dir: &Path,
        sip_id: &str,
        status: PreservationStatus,
    ) -> Result<(), ToolkitError>;
}
