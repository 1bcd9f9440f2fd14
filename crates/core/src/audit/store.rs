use chrono::{DateTime, Utc};
use thiserror::Error;

use super::AuditRecord;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Which audit events to select. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub object_id: Option<i64>,
    pub event_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    /// Events concerning one museum object.
    pub fn for_object(object_id: i64) -> Self {
        Self {
            object_id: Some(object_id),
            ..Self::default()
        }
    }

    /// Events of one type, e.g. `object_frozen`.
    pub fn of_type(event_type: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            ..Self::default()
        }
    }

    /// Restrict to an inclusive timestamp window; either bound may be open.
    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }
}

/// Slice of a newest-first result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditPage {
    pub limit: i64,
    pub offset: i64,
}

impl Default for AuditPage {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

pub trait AuditStore: Send + Sync {
    /// Append a record and return its row id.
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError>;

    /// Matching records, newest first, restricted to `page`.
    fn query(&self, filter: &AuditFilter, page: AuditPage) -> Result<Vec<AuditRecord>, AuditError>;

    /// Number of matching records, ignoring paging.
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;
}
