//! Boundary to the external preservation toolkit.
//!
//! The toolkit downloads objects, builds SIPs, uploads them and archives
//! the results. The workflow only decides when each step runs.

mod command;
mod error;
mod traits;
mod types;

pub use command::{CommandToolkit, PRESERVATION_ERROR_EXIT_CODE};
pub use error::{ToolkitError, DISK_FULL_MESSAGE};
pub use traits::PreservationToolkit;
pub use types::{DownloadedObject, SipDates};
