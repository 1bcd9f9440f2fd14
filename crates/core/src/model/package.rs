//! Package revisions (one per pipeline run) and their attachments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column limit for `museum_packages.sip_filename`.
pub const MAX_SIP_FILENAME_LEN: usize = 255;

/// One download attempt of an object, identified by its `sip_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuseumPackage {
    pub id: i64,
    pub museum_object_id: i64,
    pub sip_filename: String,
    pub sip_id: String,
    /// The object's `modified_date` as seen at download time.
    pub object_modified_date: Option<DateTime<Utc>>,
    pub created_date: DateTime<Utc>,
    pub metadata_hash: Option<String>,
    pub attachment_metadata_hash: Option<String>,
    pub downloaded: bool,
    pub packaged: bool,
    pub uploaded: bool,
    pub preserved: bool,
    pub rejected: bool,
    pub cancelled: bool,
}

/// Coarse progress of a package, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Cancelled,
    Preserved,
    Rejected,
    Uploaded,
    Packaged,
    Downloaded,
    Pending,
}

impl MuseumPackage {
    pub fn status(&self) -> PackageStatus {
        if self.cancelled {
            PackageStatus::Cancelled
        } else if self.preserved {
            PackageStatus::Preserved
        } else if self.rejected {
            PackageStatus::Rejected
        } else if self.uploaded {
            PackageStatus::Uploaded
        } else if self.packaged {
            PackageStatus::Packaged
        } else if self.downloaded {
            PackageStatus::Downloaded
        } else {
            PackageStatus::Pending
        }
    }

    /// No stage will touch this package again.
    pub fn is_finished(&self) -> bool {
        self.cancelled || self.preserved || self.rejected
    }
}

/// Everything the download stage learned, committed in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPackage {
    pub museum_object_id: i64,
    pub sip_id: String,
    pub sip_filename: String,
    pub object_modified_date: Option<DateTime<Utc>>,
    pub attachment_ids: Vec<i64>,
    pub created_date: DateTime<Utc>,
}

/// A binary or metadata attachment captured for a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MuseumAttachment {
    pub id: i64,
}

/// Archive verdict for a submitted package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreservationStatus {
    Accepted,
    Rejected,
}

impl PreservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}
