//! Boundary to the preservation archive's processed-SIP reports.

mod directory;
mod types;

pub use directory::DirectoryArchiveClient;
pub use types::{newest_per_filename, ArchiveClient, ArchiveError, ProcessedSip};
