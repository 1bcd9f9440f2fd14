//! Operator actions: manual freezes, releases, re-enqueues, workflow reset and archive sync.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::archive::newest_per_filename;
use crate::audit::AuditEvent;
use crate::metrics;
use crate::model::{Freeze, FreezeCode, FreezeSource, HeartbeatSource, PreservationStatus};
use crate::queue::{EnqueueRequest, JobHandle, JobPayload};
use crate::store::{FreezeOutcome, ResetPackage, UnfreezeFilter};

use super::{remove_dir_if_exists, Workflow, WorkflowError};

/// Confirmed packages are skipped if created within the scanned window plus this margin.
const CONFIRMED_MARGIN_DAYS: i64 = 2;

/// Manual freeze of a batch of objects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FreezeRequest {
    pub object_ids: Vec<i64>,
    pub reason: String,
    #[serde(default = "default_freeze_source")]
    pub source: FreezeSource,
    /// Also drop queued jobs and working directories of the frozen objects.
    #[serde(default)]
    pub delete_jobs: bool,
}

fn default_freeze_source() -> FreezeSource {
    FreezeSource::Manual
}

/// Release of frozen objects matching a reason and/or ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UnfreezeRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub object_ids: Option<Vec<i64>>,
    /// Enqueue a download for every released object.
    #[serde(default)]
    pub enqueue: bool,
}

/// Summary of a processed-SIP synchronisation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub accepted: usize,
    pub rejected: usize,
    /// Confirmation jobs submitted.
    pub enqueued: usize,
}

impl Workflow {
    /// Freeze objects on operator request.
    ///
    /// Refuses the whole batch if any object has a running job. Latest
    /// packages that are still in progress are cancelled.
    pub async fn freeze_objects(
        &self,
        request: &FreezeRequest,
    ) -> Result<FreezeOutcome, WorkflowError> {
        if request.object_ids.is_empty() {
            return Err(WorkflowError::InvalidRequest(
                "at least one object id is required".to_string(),
            ));
        }
        if request.reason.trim().is_empty() {
            return Err(WorkflowError::InvalidRequest(
                "a freeze reason is required".to_string(),
            ));
        }

        let _guard = self.dispatcher.lock_workflow().await;
        let queue = self.dispatcher.queue();

        let running = queue.running_object_ids().await?;
        let mut busy: Vec<i64> = request
            .object_ids
            .iter()
            .copied()
            .filter(|id| running.contains(id))
            .collect();
        if !busy.is_empty() {
            busy.sort_unstable();
            busy.dedup();
            return Err(WorkflowError::JobsRunning(busy));
        }

        let freeze = Freeze {
            code: FreezeCode::Operator,
            reason: request.reason.clone(),
            source: request.source,
        };
        let outcome = self.store.freeze_objects(&request.object_ids, &freeze)?;

        for object_id in &outcome.frozen {
            if request.delete_jobs {
                queue.delete_jobs_for_object(*object_id).await?;
                let dir = self.object_dir(*object_id);
                if let Err(e) = remove_dir_if_exists(&dir).await {
                    error!(object_id, path = %dir.display(), "Failed to remove working directory: {}", e);
                }
            }

            let cancelled_package = self
                .store
                .latest_package(*object_id)?
                .map(|package| package.sip_filename)
                .filter(|filename| outcome.cancelled_packages.contains(filename));
            self.emit(AuditEvent::ObjectFrozen {
                object_id: *object_id,
                reason: request.reason.clone(),
                source: request.source.as_str().to_string(),
                sip_id: None,
                cancelled_package,
            })
            .await;
        }

        metrics::OBJECTS_FROZEN
            .with_label_values(&[request.source.as_str()])
            .inc_by(outcome.frozen.len() as u64);
        info!(
            frozen = outcome.frozen.len(),
            cancelled = outcome.cancelled_packages.len(),
            reason = %request.reason,
            "Objects frozen"
        );

        Ok(outcome)
    }

    /// Clear the freeze of matching objects. Returns the released ids.
    pub async fn unfreeze_objects(
        &self,
        request: &UnfreezeRequest,
    ) -> Result<Vec<i64>, WorkflowError> {
        let filter = UnfreezeFilter {
            reason: request.reason.clone(),
            object_ids: request.object_ids.clone(),
        };
        if filter.is_empty() {
            return Err(WorkflowError::InvalidRequest(
                "either a reason or object ids are required".to_string(),
            ));
        }

        let _guard = self.dispatcher.lock_workflow().await;

        let released = self.store.unfreeze_objects(&filter)?;
        metrics::OBJECTS_UNFROZEN.inc_by(released.len() as u64);

        for object_id in &released {
            self.emit(AuditEvent::ObjectUnfrozen {
                object_id: *object_id,
            })
            .await;

            if request.enqueue {
                self.dispatcher
                    .enqueue(JobPayload::Download {
                        object_id: *object_id,
                        sip_id: None,
                    })
                    .await?;
            }
        }

        info!(count = released.len(), enqueue = request.enqueue, "Objects unfrozen");
        Ok(released)
    }

    /// Start a new run for an object whose latest package was rejected.
    pub async fn reenqueue_object(&self, object_id: i64) -> Result<JobHandle, WorkflowError> {
        let _guard = self.dispatcher.lock_workflow().await;
        let queue = self.dispatcher.queue();

        let object = self
            .store
            .get_object(object_id)?
            .ok_or(WorkflowError::ObjectNotFound(object_id))?;
        if object.is_frozen() {
            return Err(WorkflowError::NotReenqueueable {
                object_id,
                reason: "Object is frozen".to_string(),
            });
        }
        if let Some(latest) = self.store.latest_package(object_id)? {
            if !latest.rejected {
                return Err(WorkflowError::NotReenqueueable {
                    object_id,
                    reason: format!("Latest package {} wasn't rejected", latest.sip_filename),
                });
            }
        }
        if queue.enqueued_object_ids().await?.contains(&object_id) {
            return Err(WorkflowError::NotReenqueueable {
                object_id,
                reason: "Object is still in the workflow and can't be re-enqueued".to_string(),
            });
        }

        self.store.clear_latest_package(object_id)?;
        queue.delete_jobs_for_object(object_id).await?;
        let handle = self
            .dispatcher
            .enqueue(JobPayload::Download {
                object_id,
                sip_id: None,
            })
            .await?;

        info!(object_id, "Object re-enqueued");
        self.emit(AuditEvent::ObjectReenqueued { object_id }).await;

        Ok(handle)
    }

    /// Drop runs that never reached the archive, e.g. after restoring a database backup.
    ///
    /// Latest packages that were downloaded or packaged but not uploaded are
    /// deleted together with the object's working directory and queued jobs,
    /// making the object pending again. Objects with a running job are skipped.
    pub async fn reset_workflow(&self) -> Result<Vec<ResetPackage>, WorkflowError> {
        let _guard = self.dispatcher.lock_workflow().await;
        let queue = self.dispatcher.queue();

        let running = queue.running_object_ids().await?;
        let reset = self.store.reset_dangling_packages(&running)?;

        for package in &reset {
            queue.delete_jobs_for_object(package.object_id).await?;
            let dir = self.object_dir(package.object_id);
            if let Err(e) = remove_dir_if_exists(&dir).await {
                error!(object_id = package.object_id, path = %dir.display(), "Failed to remove working directory: {}", e);
            }
            self.emit(AuditEvent::PackageReset {
                object_id: package.object_id,
                sip_filename: package.sip_filename.clone(),
            })
            .await;
        }

        if !running.is_empty() {
            warn!(running = running.len(), "Objects with running jobs were not reset");
        }
        info!(count = reset.len(), "Workflow reset");

        Ok(reset)
    }

    /// Run a bulk enqueue as a background job instead of in the caller.
    pub async fn deferred_enqueue_objects(
        &self,
        request: EnqueueRequest,
    ) -> Result<JobHandle, WorkflowError> {
        if request.object_ids.as_ref().is_some_and(|ids| ids.is_empty()) {
            return Err(WorkflowError::InvalidRequest(
                "object_ids must not be empty".to_string(),
            ));
        }

        Ok(self
            .dispatcher
            .enqueue(JobPayload::EnqueueObjects { request })
            .await?)
    }

    /// Enqueue confirmation of SIPs the archive has processed in the last `days` days.
    pub async fn sync_processed_sips(&self, days: u32) -> Result<SyncReport, WorkflowError> {
        let now = self.clock.now();
        let since = now - Duration::days(i64::from(days) + CONFIRMED_MARGIN_DAYS);
        let confirmed = self.store.confirmed_sip_filenames(since)?;

        let accepted = self
            .archive
            .processed_sips(PreservationStatus::Accepted, days, now, &confirmed)
            .await?;
        let rejected = self
            .archive
            .processed_sips(PreservationStatus::Rejected, days, now, &confirmed)
            .await?;

        let mut report = SyncReport {
            accepted: accepted.len(),
            rejected: rejected.len(),
            enqueued: 0,
        };
        info!(
            accepted = report.accepted,
            rejected = report.rejected,
            archive = self.archive.name(),
            "Found processed SIPs"
        );

        for sip in newest_per_filename(vec![accepted, rejected]) {
            let Some(package) = self.store.package_by_filename(&sip.sip_filename)? else {
                continue;
            };
            if package.is_finished() {
                continue;
            }
            if !package.uploaded {
                warn!(
                    sip_filename = %package.sip_filename,
                    "Archive reported a SIP that was never marked uploaded"
                );
                continue;
            }

            self.dispatcher
                .enqueue(JobPayload::Confirm {
                    object_id: package.museum_object_id,
                    sip_id: package.sip_id.clone(),
                    status: sip.status,
                })
                .await?;
            metrics::PROCESSED_SIPS
                .with_label_values(&[sip.status.as_str()])
                .inc();
            report.enqueued += 1;
        }

        self.store
            .submit_heartbeat(HeartbeatSource::SyncProcessedSips, now)?;
        self.emit(AuditEvent::ProcessedSipsSynced {
            days,
            accepted: report.accepted,
            rejected: report.rejected,
            enqueued: report.enqueued,
        })
        .await;

        Ok(report)
    }
}
