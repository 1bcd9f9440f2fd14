use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use archivist_core::model::Heartbeat;
use archivist_core::store::ObjectCounts;
use archivist_core::{SanitizedConfig, StageCounts, WorkerStatus};

use super::error::{error_response, ApiError};
use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Overall workflow status
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub objects: ObjectCounts,
    pub queues: Vec<StageCounts>,
    /// Absent when background workers are disabled.
    pub workers: Option<WorkerStatus>,
    pub heartbeats: Vec<Heartbeat>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Object totals, queue depth, worker state and heartbeats
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let objects = state.store().object_counts().map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to count objects: {}", e),
        )
    })?;
    let queues = state.queue().counts().await.map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to count jobs: {}", e),
        )
    })?;
    let heartbeats = state.store().heartbeats().map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to read heartbeats: {}", e),
        )
    })?;

    let workers = match state.workers() {
        Some(workers) => Some(workers.status().await),
        None => None,
    };

    Ok(Json(StatusResponse {
        objects,
        queues,
        workers,
        heartbeats,
    }))
}

/// Prometheus scrape endpoint
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
