//! Job queue and processed-SIP sync API handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use archivist_core::{Job, JobState, Stage, SyncReport};

use super::error::{error_response, workflow_error, ApiError};
use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: usize = 1000;

/// Default limit for job queries
const DEFAULT_LIMIT: usize = 100;

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by stage queue name
    pub stage: Option<String>,
    /// Filter by job state
    pub state: Option<String>,
    /// Maximum number of jobs to return
    pub limit: Option<usize>,
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub limit: usize,
}

/// Query parameters for a processed-SIP sync
#[derive(Debug, Deserialize)]
pub struct SyncParams {
    /// Days of archive reports to scan; the configured window by default.
    pub days: Option<u32>,
}

/// List jobs, oldest first
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let stage = match params.stage.as_deref() {
        Some(name) => Some(Stage::parse(name).ok_or_else(|| {
            error_response(StatusCode::BAD_REQUEST, format!("Unknown stage: {}", name))
        })?),
        None => None,
    };
    let job_state = match params.state.as_deref() {
        Some(name) => Some(JobState::parse(name).ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                format!("Unknown job state: {}", name),
            )
        })?),
        None => None,
    };
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let jobs = state
        .queue()
        .list(stage, job_state, limit)
        .await
        .map_err(|e| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to list jobs: {}", e),
            )
        })?;

    Ok(Json(ListJobsResponse { jobs, limit }))
}

/// Ask the archive for verdicts and enqueue confirmations
pub async fn sync_processed_sips(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SyncParams>,
) -> Result<Json<SyncReport>, ApiError> {
    let days = params
        .days
        .unwrap_or(state.workflow().settings().sync_days);

    state
        .workflow()
        .sync_processed_sips(days)
        .await
        .map(Json)
        .map_err(workflow_error)
}
