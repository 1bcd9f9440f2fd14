//! Synchronisation bookkeeping shared with the source-system collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress of one named synchronisation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub name: String,
    /// When the run in progress started; `None` between runs.
    pub start_sync_date: Option<DateTime<Utc>>,
    /// Start of the last completed run, used as the incremental cursor.
    pub prev_start_sync_date: Option<DateTime<Utc>>,
    pub offset: i64,
}

/// Background tasks that report liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatSource {
    SyncProcessedSips,
    SyncObjects,
    SyncAttachments,
    SyncHashes,
}

impl HeartbeatSource {
    pub const ALL: [HeartbeatSource; 4] = [
        Self::SyncProcessedSips,
        Self::SyncObjects,
        Self::SyncAttachments,
        Self::SyncHashes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyncProcessedSips => "sync_processed_sips",
            Self::SyncObjects => "sync_objects",
            Self::SyncAttachments => "sync_attachments",
            Self::SyncHashes => "sync_hashes",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|source| source.as_str() == value)
    }
}

/// Last time a source reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub source: HeartbeatSource,
    pub timestamp: DateTime<Utc>,
}
