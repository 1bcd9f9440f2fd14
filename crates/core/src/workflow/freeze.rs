//! Automatic freeze on preservation errors.

use tracing::{error, warn};

use crate::audit::AuditEvent;
use crate::metrics;
use crate::model::{Freeze, FreezeSource};
use crate::queue::Stage;
use crate::toolkit::ToolkitError;

use super::{remove_dir_if_exists, StageOutcome, Workflow, WorkflowError};

impl Workflow {
    /// Halt an object whose stage hit a preservation error.
    ///
    /// The working directory is removed and the object frozen with the
    /// error's summary as reason. Packages are left as they are. Errors
    /// that are not preservation errors are handed back unchanged.
    pub(super) async fn freeze_running_object(
        &self,
        stage: Stage,
        object_id: i64,
        sip_id: &str,
        error: ToolkitError,
    ) -> Result<StageOutcome, WorkflowError> {
        let (detail, reason) = match error {
            ToolkitError::Preservation { detail, error } => (detail, error),
            other => return Err(other.into()),
        };

        warn!(
            object_id,
            sip_id,
            stage = %stage,
            detail = %detail,
            "Preservation error, freezing object: {}",
            reason
        );

        let dir = self.object_dir(object_id);
        if let Err(e) = remove_dir_if_exists(&dir).await {
            error!(object_id, path = %dir.display(), "Failed to remove working directory: {}", e);
        }

        self.store
            .freeze_object(object_id, &Freeze::automatic(reason.clone()))?;

        metrics::OBJECTS_FROZEN
            .with_label_values(&[FreezeSource::Automatic.as_str()])
            .inc();
        self.emit(AuditEvent::ObjectFrozen {
            object_id,
            reason: reason.clone(),
            source: FreezeSource::Automatic.as_str().to_string(),
            sip_id: Some(sip_id.to_string()),
            cancelled_package: None,
        })
        .await;

        Ok(StageOutcome::Frozen { reason })
    }
}
