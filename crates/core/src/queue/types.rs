//! Stages, payloads and deterministic job identities.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::PreservationStatus;

/// Pipeline stage; each one is served by its own logical queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Fetch object metadata and attachments into a working directory.
    Download,
    /// Assemble the submission information package.
    Package,
    /// Upload the package to the archive.
    Submit,
    /// Apply the archive's verdict.
    Confirm,
    /// Select pending objects and enqueue their downloads.
    EnqueueObjects,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Self::Download,
        Self::Package,
        Self::Submit,
        Self::Confirm,
        Self::EnqueueObjects,
    ];

    /// Queue name; also the prefix of job ids for this stage.
    pub fn queue_name(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Package => "package",
            Self::Submit => "submit",
            Self::Confirm => "confirm",
            Self::EnqueueObjects => "enqueue_objects",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.queue_name() == name)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.queue_name())
    }
}

/// Queue-level identity of a job.
///
/// Object stages use `"{stage}_{object_id}"`, so at most one job per object
/// and stage can be queued or running at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn for_object(stage: Stage, object_id: i64) -> Self {
        Self(format!("{}_{}", stage.queue_name(), object_id))
    }

    /// Identity for jobs that are not tied to one object.
    pub fn unique(stage: Stage) -> Self {
        Self(format!("{}_{}", stage.queue_name(), uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The object this job belongs to, if it is an object stage job.
    pub fn object_id(&self) -> Option<i64> {
        Stage::ALL
            .into_iter()
            .filter(|stage| *stage != Stage::EnqueueObjects)
            .find_map(|stage| {
                self.0
                    .strip_prefix(stage.queue_name())
                    .and_then(|rest| rest.strip_prefix('_'))
                    .and_then(|id| id.parse().ok())
            })
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Selection of objects to start preserving.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    /// Pick up to this many pending objects.
    #[serde(default)]
    pub object_count: Option<usize>,
    /// Enqueue exactly these objects if they are pending.
    #[serde(default)]
    pub object_ids: Option<Vec<i64>>,
    /// Pick pending objects in random order instead of by id.
    #[serde(default)]
    pub random: bool,
}

/// Arguments of a job, tagged by stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum JobPayload {
    Download {
        object_id: i64,
        /// Run identifier; derived from the clock when absent.
        #[serde(default)]
        sip_id: Option<String>,
    },
    Package {
        object_id: i64,
        sip_id: String,
    },
    Submit {
        object_id: i64,
        sip_id: String,
    },
    Confirm {
        object_id: i64,
        sip_id: String,
        status: PreservationStatus,
    },
    EnqueueObjects {
        request: EnqueueRequest,
    },
}

impl JobPayload {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Download { .. } => Stage::Download,
            Self::Package { .. } => Stage::Package,
            Self::Submit { .. } => Stage::Submit,
            Self::Confirm { .. } => Stage::Confirm,
            Self::EnqueueObjects { .. } => Stage::EnqueueObjects,
        }
    }

    pub fn object_id(&self) -> Option<i64> {
        match self {
            Self::Download { object_id, .. }
            | Self::Package { object_id, .. }
            | Self::Submit { object_id, .. }
            | Self::Confirm { object_id, .. } => Some(*object_id),
            Self::EnqueueObjects { .. } => None,
        }
    }

    /// Deterministic identity for object stages, a fresh one otherwise.
    pub fn job_id(&self) -> JobId {
        match self.object_id() {
            Some(object_id) => JobId::for_object(self.stage(), object_id),
            None => JobId::unique(self.stage()),
        }
    }
}

/// Lifecycle of a job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    /// Parked after a non-retryable error or exhausted retries.
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A job as held by the queue backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub payload: JobPayload,
    pub state: JobState,
    /// Number of times the job was claimed.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub run_after: DateTime<Utc>,
}

impl Job {
    pub fn stage(&self) -> Stage {
        self.payload.stage()
    }
}

/// Result of reserving a job id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// A new job was queued.
    Accepted,
    /// A queued job with the same id now carries the new payload.
    Replaced,
    /// A job with the same id and payload is already queued or running; nothing was added.
    AlreadyActive,
}

/// What the caller of `Dispatcher::enqueue` gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub stage: Stage,
    /// False when the submission merged into an existing job.
    pub accepted: bool,
}

/// Queue depth for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub stage: Stage,
    pub queued: u64,
    pub running: u64,
    pub failed: u64,
}

impl StageCounts {
    pub fn empty(stage: Stage) -> Self {
        Self {
            stage,
            queued: 0,
            running: 0,
            failed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_is_deterministic() {
        assert_eq!(
            JobId::for_object(Stage::Package, 123456).as_str(),
            "package_123456"
        );
        assert_eq!(
            JobId::for_object(Stage::Download, 7),
            JobId::for_object(Stage::Download, 7)
        );
        assert_ne!(
            JobId::for_object(Stage::Download, 7),
            JobId::for_object(Stage::Package, 7)
        );
    }

    #[test]
    fn test_job_id_object_id() {
        assert_eq!(JobId::for_object(Stage::Confirm, 42).object_id(), Some(42));
        assert_eq!(JobId::unique(Stage::EnqueueObjects).object_id(), None);
        assert_eq!(JobId::from("unrelated".to_string()).object_id(), None);
    }

    #[test]
    fn test_payload_job_id_ignores_sip_id() {
        let first = JobPayload::Package {
            object_id: 1,
            sip_id: "20190203-120000".to_string(),
        };
        let second = JobPayload::Package {
            object_id: 1,
            sip_id: "20190203-131515".to_string(),
        };
        assert_eq!(first.job_id(), second.job_id());
    }

    #[test]
    fn test_enqueue_objects_ids_are_unique() {
        let payload = JobPayload::EnqueueObjects {
            request: EnqueueRequest::default(),
        };
        assert_ne!(payload.job_id(), payload.job_id());
    }

    #[test]
    fn test_payload_serialization_is_tagged() {
        let payload = JobPayload::Download {
            object_id: 123456,
            sip_id: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["stage"], "download");
        assert_eq!(json["object_id"], 123456);

        let parsed: JobPayload =
            serde_json::from_str(r#"{"stage":"download","object_id":5}"#).unwrap();
        assert_eq!(parsed.object_id(), Some(5));
    }

    #[test]
    fn test_stage_parse() {
        for stage in Stage::ALL {
            assert_eq!(Stage::parse(stage.queue_name()), Some(stage));
        }
        assert_eq!(Stage::parse("upload"), None);
    }
}
