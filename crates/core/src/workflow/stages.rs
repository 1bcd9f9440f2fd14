//! Handlers for the pipeline stages.

use tracing::{debug, info};

use crate::audit::AuditEvent;
use crate::model::{MuseumPackage, NewPackage, PreservationStatus};
use crate::queue::{EnqueueRequest, JobPayload, Stage};
use crate::toolkit::{SipDates, ToolkitError};

use super::{sip_id_at, StageOutcome, Workflow, WorkflowError};

/// Objects picked by a bulk enqueue that names neither a count nor ids.
pub const DEFAULT_ENQUEUE_COUNT: usize = 10;

impl Workflow {
    /// Download an object and start a new preservation run.
    ///
    /// Without `sip_id` the run is named after the current second, so two
    /// downloads of one object within the same second collide and the
    /// second fails with [`WorkflowError::DuplicatePackage`].
    pub async fn download_object(
        &self,
        object_id: i64,
        sip_id: Option<String>,
    ) -> Result<StageOutcome, WorkflowError> {
        let now = self.clock.now();
        let sip_id = sip_id.unwrap_or_else(|| sip_id_at(now));

        let object = self
            .store
            .get_object(object_id)?
            .ok_or(WorkflowError::ObjectNotFound(object_id))?;
        if object.is_frozen() {
            return Err(WorkflowError::ObjectFrozen(object_id));
        }

        let sip_filename = self.toolkit.sip_filename(object_id, &sip_id);
        if self.store.package_by_filename(&sip_filename)?.is_some() {
            return Err(WorkflowError::DuplicatePackage {
                filename: sip_filename,
            });
        }

        info!(object_id, sip_id = %sip_id, "Downloading object");
        let downloaded = match self
            .toolkit
            .download_object(object_id, &self.settings.package_dir, &sip_id)
            .await
        {
            Ok(downloaded) => downloaded,
            Err(e) if e.is_domain() => {
                return self
                    .freeze_running_object(Stage::Download, object_id, &sip_id, e)
                    .await;
            }
            Err(e) => return Err(e.into()),
        };
        if downloaded.sip_filename != sip_filename {
            // Duplicate detection relies on the name computed before the download
            return Err(ToolkitError::Unavailable(format!(
                "toolkit reported package {} for run {}, expected {}",
                downloaded.sip_filename, sip_id, sip_filename
            ))
            .into());
        }

        let attachment_count = downloaded.attachment_ids.len();
        let package = self.store.record_download(&NewPackage {
            museum_object_id: object_id,
            sip_id: sip_id.clone(),
            sip_filename: downloaded.sip_filename,
            object_modified_date: downloaded.modified_date,
            attachment_ids: downloaded.attachment_ids,
            created_date: now,
        })?;

        info!(
            object_id,
            sip_filename = %package.sip_filename,
            attachment_count,
            "Object downloaded"
        );
        self.emit(AuditEvent::PackageDownloaded {
            object_id,
            sip_id: sip_id.clone(),
            sip_filename: package.sip_filename.clone(),
            attachment_count,
        })
        .await;

        let next = self
            .dispatcher
            .enqueue(JobPayload::Package { object_id, sip_id })
            .await?;

        Ok(StageOutcome::Completed { next: Some(next) })
    }

    /// Build the SIP of a downloaded run.
    pub async fn create_sip(
        &self,
        object_id: i64,
        sip_id: &str,
    ) -> Result<StageOutcome, WorkflowError> {
        let package = self.active_package(object_id, sip_id)?;
        if !package.downloaded {
            return Err(WorkflowError::InvalidPackageState {
                sip_filename: package.sip_filename,
                required: "downloaded",
            });
        }

        if package.packaged {
            // A previous attempt committed but did not get to enqueue the upload.
            debug!(object_id, sip_filename = %package.sip_filename, "Package already created");
            return self.enqueue_submit(object_id, sip_id).await;
        }

        let dates = self.sip_dates(&package)?;
        info!(
            object_id,
            sip_filename = %package.sip_filename,
            update = dates.is_update(),
            "Creating SIP"
        );
        if let Err(e) = self
            .toolkit
            .create_sip(object_id, &self.settings.package_dir, sip_id, dates)
            .await
        {
            if e.is_domain() {
                return self
                    .freeze_running_object(Stage::Package, object_id, sip_id, e)
                    .await;
            }
            return Err(e.into());
        }

        self.store.mark_packaged(package.id)?;
        self.emit(AuditEvent::SipCreated {
            object_id,
            sip_id: sip_id.to_string(),
            update: dates.is_update(),
        })
        .await;

        self.enqueue_submit(object_id, sip_id).await
    }

    /// Upload a created SIP.
    ///
    /// The archive reports its verdict asynchronously, so no follow-up job is
    /// enqueued here; [`Workflow::sync_processed_sips`] enqueues confirmation.
    pub async fn submit_sip(
        &self,
        object_id: i64,
        sip_id: &str,
    ) -> Result<StageOutcome, WorkflowError> {
        let package = self.active_package(object_id, sip_id)?;
        if package.uploaded {
            return Err(WorkflowError::AlreadyUploaded(package.sip_filename));
        }
        if !package.packaged {
            return Err(WorkflowError::InvalidPackageState {
                sip_filename: package.sip_filename,
                required: "packaged",
            });
        }

        info!(object_id, sip_filename = %package.sip_filename, "Submitting SIP");
        if let Err(e) = self
            .toolkit
            .submit_sip(object_id, &self.settings.package_dir, sip_id)
            .await
        {
            if e.is_domain() {
                return self
                    .freeze_running_object(Stage::Submit, object_id, sip_id, e)
                    .await;
            }
            return Err(e.into());
        }

        self.store.mark_uploaded(package.id)?;
        self.emit(AuditEvent::SipSubmitted {
            object_id,
            sip_id: sip_id.to_string(),
        })
        .await;

        Ok(StageOutcome::Completed { next: None })
    }

    /// Apply the archive's verdict. Terminal stage.
    pub async fn confirm_sip(
        &self,
        object_id: i64,
        sip_id: &str,
        status: PreservationStatus,
    ) -> Result<StageOutcome, WorkflowError> {
        let package = self.active_package(object_id, sip_id)?;
        if !package.uploaded || package.preserved || package.rejected {
            return Err(WorkflowError::InvalidPackageState {
                sip_filename: package.sip_filename,
                required: "awaiting confirmation",
            });
        }

        info!(
            object_id,
            sip_filename = %package.sip_filename,
            status = status.as_str(),
            "Confirming SIP"
        );
        if let Err(e) = self
            .toolkit
            .confirm_sip(
                object_id,
                &self.settings.package_dir,
                &self.settings.archive_dir,
                sip_id,
                status,
            )
            .await
        {
            if e.is_domain() {
                return self
                    .freeze_running_object(Stage::Confirm, object_id, sip_id, e)
                    .await;
            }
            return Err(e.into());
        }

        self.store.mark_confirmed(package.id, status)?;
        self.emit(AuditEvent::SipConfirmed {
            object_id,
            sip_id: sip_id.to_string(),
            status: status.as_str().to_string(),
        })
        .await;

        Ok(StageOutcome::Completed { next: None })
    }

    /// Enqueue downloads for pending objects that are not in any queue yet.
    ///
    /// `object_ids` restricts the selection to those objects and overrides
    /// `object_count`. Runs under the workflow lock.
    pub async fn enqueue_objects(
        &self,
        request: &EnqueueRequest,
    ) -> Result<StageOutcome, WorkflowError> {
        let limit = match (&request.object_ids, request.object_count) {
            (Some(ids), _) => ids.len(),
            (None, Some(count)) => count,
            (None, None) => DEFAULT_ENQUEUE_COUNT,
        };
        if limit == 0 {
            return Ok(StageOutcome::Enqueued { count: 0 });
        }

        let _guard = self.dispatcher.lock_workflow().await;

        let enqueued = self.dispatcher.queue().enqueued_object_ids().await?;
        let mut pending =
            self.store
                .pending_object_ids(self.clock.now(), self.settings.delays, request.random)?;
        if let Some(ref ids) = request.object_ids {
            pending.retain(|id| ids.contains(id));
        }

        let mut count = 0;
        for object_id in pending {
            if count >= limit {
                break;
            }
            if enqueued.contains(&object_id) {
                continue;
            }

            let handle = self
                .dispatcher
                .enqueue(JobPayload::Download {
                    object_id,
                    sip_id: None,
                })
                .await?;
            if handle.accepted {
                debug!(job_id = %handle.job_id, "Enqueued download");
                count += 1;
            }
        }

        info!(count, random = request.random, "Objects enqueued for download");
        self.emit(AuditEvent::ObjectsEnqueued {
            count,
            random: request.random,
        })
        .await;

        Ok(StageOutcome::Enqueued { count })
    }

    /// Load the package of a run after checking the object and the package can progress.
    ///
    /// Only the object's latest run progresses; jobs of superseded runs fail fast.
    fn active_package(&self, object_id: i64, sip_id: &str) -> Result<MuseumPackage, WorkflowError> {
        let object = self
            .store
            .get_object(object_id)?
            .ok_or(WorkflowError::ObjectNotFound(object_id))?;
        if object.is_frozen() {
            return Err(WorkflowError::ObjectFrozen(object_id));
        }

        let package = self.store.get_package(object_id, sip_id)?.ok_or_else(|| {
            WorkflowError::PackageNotFound(format!("object {} run {}", object_id, sip_id))
        })?;
        if package.cancelled {
            return Err(WorkflowError::PackageCancelled(package.sip_filename));
        }
        if object.latest_package_id != Some(package.id) {
            return Err(WorkflowError::StalePackage(package.sip_filename));
        }

        Ok(package)
    }

    /// An update carries the create date of the last preserved run.
    fn sip_dates(&self, package: &MuseumPackage) -> Result<SipDates, WorkflowError> {
        let last_preserved = self
            .store
            .last_preserved_package(package.museum_object_id)?
            .filter(|preserved| preserved.id != package.id);

        Ok(match last_preserved {
            Some(preserved) => SipDates {
                create_date: preserved.created_date,
                modify_date: Some(package.created_date),
            },
            None => SipDates {
                create_date: package.created_date,
                modify_date: None,
            },
        })
    }

    async fn enqueue_submit(
        &self,
        object_id: i64,
        sip_id: &str,
    ) -> Result<StageOutcome, WorkflowError> {
        let next = self
            .dispatcher
            .enqueue(JobPayload::Submit {
                object_id,
                sip_id: sip_id.to_string(),
            })
            .await?;

        Ok(StageOutcome::Completed { next: Some(next) })
    }
}
