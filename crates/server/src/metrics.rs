//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the archivist server:
//! - HTTP request metrics (latency, counts)
//! - Queue depth and object totals (collected dynamically)
//! - Workflow metrics registered by `archivist_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use archivist_core::JobState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "archivist_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("archivist_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "archivist_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Workflow State (collected dynamically)
// =============================================================================

/// Jobs per stage and state.
pub static QUEUE_JOBS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("archivist_queue_jobs", "Current job count by stage and state"),
        &["stage", "state"],
    )
    .unwrap()
});

/// Museum objects by condition.
pub static OBJECTS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("archivist_objects", "Museum objects by condition"),
        &["condition"],
    )
    .unwrap()
});

/// Worker pool running state (1 = running, 0 = stopped).
pub static WORKERS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "archivist_workers_running",
        "Whether the worker pool is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Jobs executing right now.
pub static WORKERS_ACTIVE_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "archivist_workers_active_jobs",
        "Number of jobs currently executing",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Workflow state
    registry.register(Box::new(QUEUE_JOBS.clone())).unwrap();
    registry.register(Box::new(OBJECTS.clone())).unwrap();
    registry
        .register(Box::new(WORKERS_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(WORKERS_ACTIVE_JOBS.clone()))
        .unwrap();

    // Core metrics (jobs, freezes, archive sync)
    for metric in archivist_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the store, the queue and the
/// worker pool at scrape time.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    if let Ok(counts) = state.queue().counts().await {
        for stage in counts {
            let name = stage.stage.queue_name();
            for (job_state, count) in [
                (JobState::Queued, stage.queued),
                (JobState::Running, stage.running),
                (JobState::Failed, stage.failed),
            ] {
                QUEUE_JOBS
                    .with_label_values(&[name, job_state.as_str()])
                    .set(count as i64);
            }
        }
    }

    if let Ok(counts) = state.store().object_counts() {
        OBJECTS.with_label_values(&["total"]).set(counts.total);
        OBJECTS.with_label_values(&["frozen"]).set(counts.frozen);
        OBJECTS.with_label_values(&["preserved"]).set(counts.preserved);
    }

    match state.workers() {
        Some(workers) => {
            let status = workers.status().await;
            WORKERS_RUNNING.set(if status.running { 1 } else { 0 });
            WORKERS_ACTIVE_JOBS.set(status.active_jobs as i64);
        }
        None => {
            WORKERS_RUNNING.set(0);
            WORKERS_ACTIVE_JOBS.set(0);
        }
    }
}

/// Numeric path segments, i.e. object ids.
static NUMERIC_SEGMENT: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    NUMERIC_SEGMENT.replace_all(path, "/{id}$1").into_owned()
}
