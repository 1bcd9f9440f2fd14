//! Persisted entities of the preservation workflow.

mod object;
mod package;
mod sync;

pub use object::{
    Freeze, FreezeCode, FreezeSource, MuseumObject, ObjectSnapshot, PreservationDelays,
};
pub use package::{
    MuseumAttachment, MuseumPackage, NewPackage, PackageStatus, PreservationStatus,
    MAX_SIP_FILENAME_LEN,
};
pub use sync::{Heartbeat, HeartbeatSource, SyncStatus};
