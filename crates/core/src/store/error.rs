//! Store error types.

use thiserror::Error;

/// Errors returned by workflow store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No museum object with this id.
    #[error("museum object not found: {0}")]
    ObjectNotFound(i64),

    /// No package matched the lookup.
    #[error("package not found: {0}")]
    PackageNotFound(String),

    /// A package with this filename already exists.
    #[error("Package with filename {filename} already exists")]
    DuplicatePackage { filename: String },

    /// The object is frozen and cannot progress.
    #[error("museum object {0} is frozen")]
    ObjectFrozen(i64),

    /// The package was cancelled and cannot progress.
    #[error("package {0} is cancelled")]
    PackageCancelled(String),

    /// The package belongs to a run that is no longer the object's latest.
    #[error("package {0} is not the latest run of its object")]
    StalePackage(String),

    /// The package has not reached the state this transition requires.
    #[error("package {sip_filename} is not {required}")]
    InvalidPackageState {
        sip_filename: String,
        required: &'static str,
    },

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Failures of the storage engine itself, as opposed to workflow state conflicts.
    pub fn is_database(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}
