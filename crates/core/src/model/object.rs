//! Museum objects and their freeze state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PackageConfig;

use super::MuseumPackage;

/// Who put an object on hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezeSource {
    /// A stage handler hit an unrecoverable domain error.
    Automatic,
    /// An operator froze the object.
    Manual,
}

impl FreezeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "automatic" => Some(Self::Automatic),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Structured reason code for a freeze; the free text lives in [`Freeze::reason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezeCode {
    /// The toolkit rejected the object's content or metadata.
    PreservationError,
    /// Held by an operator.
    Operator,
}

impl FreezeCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreservationError => "preservation_error",
            Self::Operator => "operator",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "preservation_error" => Some(Self::PreservationError),
            "operator" => Some(Self::Operator),
            _ => None,
        }
    }
}

/// A durable hold on further processing of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freeze {
    pub code: FreezeCode,
    pub reason: String,
    pub source: FreezeSource,
}

impl Freeze {
    /// Freeze raised by a stage handler on a domain error.
    pub fn automatic(reason: impl Into<String>) -> Self {
        Self {
            code: FreezeCode::PreservationError,
            reason: reason.into(),
            source: FreezeSource::Automatic,
        }
    }

    /// Freeze requested by an operator.
    pub fn manual(reason: impl Into<String>) -> Self {
        Self {
            code: FreezeCode::Operator,
            reason: reason.into(),
            source: FreezeSource::Manual,
        }
    }
}

/// One source-system entity to be preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuseumObject {
    pub id: i64,
    pub title: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
    pub modified_date: Option<DateTime<Utc>>,
    pub metadata_hash: Option<String>,
    pub attachment_metadata_hash: Option<String>,
    /// Set once any package of this object has been accepted by the archive.
    pub preserved: bool,
    pub freeze: Option<Freeze>,
    pub latest_package_id: Option<i64>,
}

/// Object fields owned by the source-system synchroniser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata_hash: Option<String>,
    #[serde(default)]
    pub attachment_metadata_hash: Option<String>,
}

/// How long objects must age before (re)entering the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreservationDelays {
    pub preservation: Duration,
    pub update: Duration,
}

impl PreservationDelays {
    pub fn from_secs(preservation_secs: u64, update_secs: u64) -> Self {
        Self {
            preservation: Duration::seconds(preservation_secs as i64),
            update: Duration::seconds(update_secs as i64),
        }
    }
}

impl From<&PackageConfig> for PreservationDelays {
    fn from(config: &PackageConfig) -> Self {
        Self::from_secs(config.preservation_delay_secs, config.update_delay_secs)
    }
}

impl MuseumObject {
    pub fn is_frozen(&self) -> bool {
        self.freeze.is_some()
    }

    /// Whether the object is a candidate for a new preservation run.
    ///
    /// `latest` must be the package referenced by `latest_package_id`.
    /// Mirrors the query used by `WorkflowStore::pending_object_ids`.
    pub fn preservation_pending(
        &self,
        latest: Option<&MuseumPackage>,
        now: DateTime<Utc>,
        delays: PreservationDelays,
    ) -> bool {
        if self.is_frozen()
            || self.metadata_hash.is_none()
            || self.attachment_metadata_hash.is_none()
        {
            return false;
        }

        let preservation_boundary = now - delays.preservation;
        let update_boundary = now - delays.update;

        match latest {
            None => self
                .created_date
                .is_none_or(|created| created < preservation_boundary),
            Some(package) if package.cancelled => true,
            Some(package) => {
                package.object_modified_date != self.modified_date
                    && package
                        .object_modified_date
                        .is_none_or(|modified| modified < update_boundary)
                    && (package.metadata_hash != self.metadata_hash
                        || package.attachment_metadata_hash != self.attachment_metadata_hash)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    fn delays() -> PreservationDelays {
        PreservationDelays::from_secs(30 * 86_400, 30 * 86_400)
    }

    #[test]
    fn test_freeze_source_round_trip_strings() {
        for source in [FreezeSource::Automatic, FreezeSource::Manual] {
            assert_eq!(FreezeSource::parse(source.as_str()), Some(source));
        }
        assert_eq!(FreezeSource::parse("AUTOMATIC"), None);
    }

    #[test]
    fn test_new_object_pending_after_delay() {
        let now = fixtures::test_date();
        let mut object = fixtures::museum_object(1);
        object.created_date = Some(now - Duration::days(31));
        assert!(object.preservation_pending(None, now, delays()));

        object.created_date = Some(now - Duration::days(5));
        assert!(!object.preservation_pending(None, now, delays()));

        object.created_date = None;
        assert!(object.preservation_pending(None, now, delays()));
    }

    #[test]
    fn test_frozen_or_incomplete_object_not_pending() {
        let now = fixtures::test_date();
        let mut object = fixtures::museum_object(1);
        object.freeze = Some(Freeze::manual("on hold"));
        assert!(!object.preservation_pending(None, now, delays()));

        let mut object = fixtures::museum_object(1);
        object.attachment_metadata_hash = None;
        assert!(!object.preservation_pending(None, now, delays()));
    }

    #[test]
    fn test_modified_object_pending_once_modification_ages() {
        let now = fixtures::test_date();
        let mut object = fixtures::museum_object(1);
        let mut package = fixtures::museum_package(1, "20190101-000000");
        package.object_modified_date = Some(now - Duration::days(60));
        package.metadata_hash = Some("old".to_string());

        object.modified_date = Some(now - Duration::days(2));
        assert!(object.preservation_pending(Some(&package), now, delays()));

        package.object_modified_date = Some(now - Duration::days(3));
        assert!(!object.preservation_pending(Some(&package), now, delays()));
    }

    #[test]
    fn test_unchanged_hashes_not_pending() {
        let now = fixtures::test_date();
        let mut object = fixtures::museum_object(1);
        let mut package = fixtures::museum_package(1, "20190101-000000");
        package.object_modified_date = Some(now - Duration::days(60));
        package.metadata_hash = object.metadata_hash.clone();
        package.attachment_metadata_hash = object.attachment_metadata_hash.clone();
        object.modified_date = Some(now - Duration::days(40));
        assert!(!object.preservation_pending(Some(&package), now, delays()));
    }

    #[test]
    fn test_cancelled_latest_package_pending() {
        let now = fixtures::test_date();
        let object = fixtures::museum_object(1);
        let mut package = fixtures::museum_package(1, "20190101-000000");
        package.object_modified_date = object.modified_date;
        package.cancelled = true;
        assert!(object.preservation_pending(Some(&package), now, delays()));
    }
}
