//! Error types for the preservation toolkit boundary.

use thiserror::Error;

/// Shown instead of the raw I/O error when the package directory fills up.
pub const DISK_FULL_MESSAGE: &str = "Ran out of disk space. The package directory may have run out \
     of space while downloading a large attachment. Remove packages from the directory and \
     retry with fewer packages processed at the same time.";

/// Errors raised by the preservation toolkit.
#[derive(Debug, Error)]
pub enum ToolkitError {
    /// The object's content or metadata cannot be preserved. Never retried.
    #[error("preservation error: {error}")]
    Preservation {
        /// Technical detail for logs.
        detail: String,
        /// Human-readable summary, used as the freeze reason.
        error: String,
    },

    /// The toolkit could not be started or crashed.
    #[error("toolkit unavailable: {0}")]
    Unavailable(String),

    /// The package directory ran out of space.
    #[error("{}", DISK_FULL_MESSAGE)]
    DiskFull,

    /// Local filesystem failure.
    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

impl ToolkitError {
    pub fn preservation(detail: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Preservation {
            detail: detail.into(),
            error: error.into(),
        }
    }

    /// Domain errors freeze the object; everything else is infrastructure.
    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Preservation { .. })
    }
}

impl From<std::io::Error> for ToolkitError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::StorageFull {
            Self::DiskFull
        } else {
            Self::Io(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_preservation_errors_are_domain_errors() {
        assert!(ToolkitError::preservation("detail", "Filename was not supported").is_domain());
        assert!(!ToolkitError::Unavailable("gone".to_string()).is_domain());
        assert!(!ToolkitError::DiskFull.is_domain());
    }

    #[test]
    fn test_storage_full_is_reported_as_disk_full() {
        let error = ToolkitError::from(std::io::Error::from(std::io::ErrorKind::StorageFull));
        assert!(matches!(error, ToolkitError::DiskFull));
        assert!(error.to_string().starts_with("Ran out of disk space"));
    }

    #[test]
    fn test_preservation_error_message_uses_summary() {
        let error = ToolkitError::preservation("Mock detailed error message", "Unsupported file");
        assert_eq!(error.to_string(), "preservation error: Unsupported file");
    }
}
