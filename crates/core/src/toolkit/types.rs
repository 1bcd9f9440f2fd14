//! Values exchanged with the preservation toolkit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the toolkit fetched for one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedObject {
    /// Filename of the package that will be built for this run.
    pub sip_filename: String,
    /// The object's `modified_date` in the source system.
    #[serde(default)]
    pub modified_date: Option<DateTime<Utc>>,
    /// Attachments actually retrieved.
    #[serde(default)]
    pub attachment_ids: Vec<i64>,
}

/// Dates written into a SIP.
///
/// A first submission only has a create date. An update of a preserved
/// object carries the original create date and the new run's date as modify date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipDates {
    pub create_date: DateTime<Utc>,
    pub modify_date: Option<DateTime<Utc>>,
}

impl SipDates {
    pub fn is_update(&self) -> bool {
        self.modify_date.is_some()
    }
}
