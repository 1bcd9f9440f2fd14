use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Pipeline progress
    PackageDownloaded {
        object_id: i64,
        sip_id: String,
        sip_filename: String,
        attachment_count: usize,
    },
    SipCreated {
        object_id: i64,
        sip_id: String,
        /// Whether the SIP updates an already preserved object.
        update: bool,
    },
    SipSubmitted {
        object_id: i64,
        sip_id: String,
    },
    SipConfirmed {
        object_id: i64,
        sip_id: String,
        status: String,
    },

    // Freeze lifecycle
    ObjectFrozen {
        object_id: i64,
        reason: String,
        source: String,
        /// Run that raised an automatic freeze.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sip_id: Option<String>,
        /// In-progress package cancelled by a manual freeze.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cancelled_package: Option<String>,
    },
    ObjectUnfrozen {
        object_id: i64,
    },

    // Operator actions
    ObjectReenqueued {
        object_id: i64,
    },
    /// Dangling run removed by a workflow reset.
    PackageReset {
        object_id: i64,
        sip_filename: String,
    },
    ObjectsEnqueued {
        count: usize,
        random: bool,
    },
    ProcessedSipsSynced {
        days: u32,
        accepted: usize,
        rejected: usize,
        enqueued: usize,
    },

    // Job failures
    JobFailed {
        job_id: String,
        stage: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        object_id: Option<i64>,
        attempts: u32,
        error: String,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::PackageDownloaded { .. } => "package_downloaded",
            Self::SipCreated { .. } => "sip_created",
            Self::SipSubmitted { .. } => "sip_submitted",
            Self::SipConfirmed { .. } => "sip_confirmed",
            Self::ObjectFrozen { .. } => "object_frozen",
            Self::ObjectUnfrozen { .. } => "object_unfrozen",
            Self::ObjectReenqueued { .. } => "object_reenqueued",
            Self::PackageReset { .. } => "package_reset",
            Self::ObjectsEnqueued { .. } => "objects_enqueued",
            Self::ProcessedSipsSynced { .. } => "processed_sips_synced",
            Self::JobFailed { .. } => "job_failed",
        }
    }

    /// Returns the object ID if this event is object-related
    pub fn object_id(&self) -> Option<i64> {
        match self {
            Self::PackageDownloaded { object_id, .. }
            | Self::SipCreated { object_id, .. }
            | Self::SipSubmitted { object_id, .. }
            | Self::SipConfirmed { object_id, .. }
            | Self::ObjectFrozen { object_id, .. }
            | Self::ObjectUnfrozen { object_id }
            | Self::ObjectReenqueued { object_id }
            | Self::PackageReset { object_id, .. } => Some(*object_id),
            Self::JobFailed { object_id, .. } => *object_id,
            Self::ServiceStarted { .. }
            | Self::ServiceStopped { .. }
            | Self::ObjectsEnqueued { .. }
            | Self::ProcessedSipsSynced { .. } => None,
        }
    }
}

/// Stored audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub object_id: Option<i64>,
    pub data: AuditEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_service_started() {
        let event = AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
        };
        assert_eq!(event.event_type(), "service_started");
        assert_eq!(event.object_id(), None);
    }

    #[test]
    fn test_event_type_package_downloaded() {
        let event = AuditEvent::PackageDownloaded {
            object_id: 123456,
            sip_id: "20190203-120000".to_string(),
            sip_filename: "fake_package-20190203-120000.tar".to_string(),
            attachment_count: 2,
        };
        assert_eq!(event.event_type(), "package_downloaded");
        assert_eq!(event.object_id(), Some(123456));
    }

    #[test]
    fn test_event_type_job_failed_without_object() {
        let event = AuditEvent::JobFailed {
            job_id: "enqueue_objects_abc".to_string(),
            stage: "enqueue_objects".to_string(),
            object_id: None,
            attempts: 3,
            error: "queue backend error".to_string(),
        };
        assert_eq!(event.event_type(), "job_failed");
        assert_eq!(event.object_id(), None);
    }

    #[test]
    fn test_serialize_object_frozen() {
        let event = AuditEvent::ObjectFrozen {
            object_id: 7,
            reason: "Filename was not supported".to_string(),
            source: "automatic".to_string(),
            sip_id: Some("20190203-120000".to_string()),
            cancelled_package: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"object_frozen\""));
        assert!(json.contains("\"source\":\"automatic\""));
        assert!(!json.contains("cancelled_package"));

        let parsed: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
