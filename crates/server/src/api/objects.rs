//! Museum object API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use archivist_core::model::{MuseumObject, MuseumPackage, ObjectSnapshot, PackageStatus};
use archivist_core::store::{FreezeOutcome, ResetPackage};
use archivist_core::{
    EnqueueRequest, FreezeRequest, Job, JobHandle, StageOutcome, UnfreezeRequest,
};

use super::error::{error_response, workflow_error, ApiError};
use crate::state::AppState;

/// Jobs scanned when collecting the jobs of one object
const JOB_SCAN_LIMIT: usize = 10_000;

// ============================================================================
// Request/Response Types
// ============================================================================

/// A package with its derived status
#[derive(Debug, Serialize)]
pub struct PackageResponse {
    #[serde(flatten)]
    pub package: MuseumPackage,
    pub status: PackageStatus,
}

impl From<MuseumPackage> for PackageResponse {
    fn from(package: MuseumPackage) -> Self {
        Self {
            status: package.status(),
            package,
        }
    }
}

/// Object detail response
#[derive(Debug, Serialize)]
pub struct ObjectResponse {
    pub object: MuseumObject,
    /// Every run of the object, oldest first.
    pub packages: Vec<PackageResponse>,
    /// Queued, running and failed jobs of the object.
    pub jobs: Vec<Job>,
}

/// Request body for bulk enqueue
#[derive(Debug, Deserialize)]
pub struct EnqueueBody {
    #[serde(flatten)]
    pub request: EnqueueRequest,
    /// Run the selection as a background job.
    #[serde(default)]
    pub deferred: bool,
}

/// Response for bulk enqueue
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum EnqueueResponse {
    Enqueued { count: usize },
    Deferred { job: JobHandle },
}

/// Response for workflow reset
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub count: usize,
    pub packages: Vec<ResetPackage>,
}

/// Response for unfreeze
#[derive(Debug, Serialize)]
pub struct UnfreezeResponse {
    pub count: usize,
    pub object_ids: Vec<i64>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create or update an object from source-system data
pub async fn upsert_object(
    State(state): State<Arc<AppState>>,
    Json(snapshot): Json<ObjectSnapshot>,
) -> Result<Json<MuseumObject>, ApiError> {
    state.store().upsert_object(&snapshot).map(Json).map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to store object: {}", e),
        )
    })
}

/// Get an object with its packages and jobs
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ObjectResponse>, ApiError> {
    let internal = |e: String| error_response(StatusCode::INTERNAL_SERVER_ERROR, e);

    let object = state
        .store()
        .get_object(id)
        .map_err(|e| internal(format!("Failed to get object: {}", e)))?
        .ok_or_else(|| {
            error_response(StatusCode::NOT_FOUND, format!("Object not found: {}", id))
        })?;

    let packages = state
        .store()
        .list_packages(id)
        .map_err(|e| internal(format!("Failed to list packages: {}", e)))?
        .into_iter()
        .map(PackageResponse::from)
        .collect();

    let jobs = state
        .queue()
        .list(None, None, JOB_SCAN_LIMIT)
        .await
        .map_err(|e| internal(format!("Failed to list jobs: {}", e)))?
        .into_iter()
        .filter(|job| job.payload.object_id() == Some(id))
        .collect();

    Ok(Json(ObjectResponse {
        object,
        packages,
        jobs,
    }))
}

/// Enqueue downloads for pending objects
pub async fn enqueue_objects(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EnqueueBody>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    if body.deferred {
        let job = state
            .workflow()
            .deferred_enqueue_objects(body.request)
            .await
            .map_err(workflow_error)?;
        return Ok((StatusCode::ACCEPTED, Json(EnqueueResponse::Deferred { job })));
    }

    match state
        .workflow()
        .enqueue_objects(&body.request)
        .await
        .map_err(workflow_error)?
    {
        StageOutcome::Enqueued { count } => {
            Ok((StatusCode::OK, Json(EnqueueResponse::Enqueued { count })))
        }
        other => Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unexpected enqueue outcome: {:?}", other),
        )),
    }
}

/// Freeze objects on operator request
pub async fn freeze_objects(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FreezeRequest>,
) -> Result<Json<FreezeOutcome>, ApiError> {
    state
        .workflow()
        .freeze_objects(&request)
        .await
        .map(Json)
        .map_err(workflow_error)
}

/// Release frozen objects
pub async fn unfreeze_objects(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UnfreezeRequest>,
) -> Result<Json<UnfreezeResponse>, ApiError> {
    let object_ids = state
        .workflow()
        .unfreeze_objects(&request)
        .await
        .map_err(workflow_error)?;

    Ok(Json(UnfreezeResponse {
        count: object_ids.len(),
        object_ids,
    }))
}

/// Start a new run for an object whose latest package was rejected
pub async fn reenqueue_object(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<JobHandle>), ApiError> {
    state
        .workflow()
        .reenqueue_object(id)
        .await
        .map(|handle| (StatusCode::ACCEPTED, Json(handle)))
        .map_err(workflow_error)
}

/// Remove runs that were never uploaded so their objects start over
pub async fn reset_workflow(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ResetResponse>, ApiError> {
    let packages = state
        .workflow()
        .reset_workflow()
        .await
        .map_err(workflow_error)?;

    Ok(Json(ResetResponse {
        count: packages.len(),
        packages,
    }))
}
