//! Relational store for objects, packages and workflow bookkeeping.

mod error;
mod sqlite_store;
mod traits;

pub use error::StoreError;
pub use sqlite_store::SqliteWorkflowStore;
pub(crate) use sqlite_store::{format_timestamp, parse_timestamp};
pub use traits::{FreezeOutcome, ObjectCounts, ResetPackage, UnfreezeFilter, WorkflowStore};
