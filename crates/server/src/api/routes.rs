use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{audit, handlers, jobs, middleware::metrics_middleware, objects};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and status
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/status", get(handlers::get_status))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Objects
        .route("/objects", post(objects::upsert_object))
        .route("/objects/enqueue", post(objects::enqueue_objects))
        .route("/objects/freeze", post(objects::freeze_objects))
        .route("/objects/unfreeze", post(objects::unfreeze_objects))
        .route("/objects/{id}", get(objects::get_object))
        .route("/objects/{id}/reenqueue", post(objects::reenqueue_object))
        .route("/workflow/reset", post(objects::reset_workflow))
        // Jobs and archive sync
        .route("/jobs", get(jobs::list_jobs))
        .route("/sync/processed-sips", post(jobs::sync_processed_sips))
        .with_state(Arc::clone(&state));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
