//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Job dispatch (submissions per stage, merged duplicates)
//! - Stage execution (results, durations)
//! - Freezes and archive sync

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Dispatch Metrics
// =============================================================================

/// Job submissions by stage and result.
pub static JOBS_ENQUEUED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("archivist_jobs_enqueued_total", "Total job submissions"),
        &["stage", "result"], // "accepted", "replaced", "already_active", "error"
    )
    .unwrap()
});

// =============================================================================
// Stage Execution Metrics
// =============================================================================

/// Executed jobs by stage and result.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("archivist_jobs_total", "Total executed jobs"),
        &["stage", "result"], // "completed", "frozen", "retried", "failed"
    )
    .unwrap()
});

/// Job execution duration in seconds.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "archivist_job_duration_seconds",
            "Duration of a stage handler run",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]),
        &["stage"],
    )
    .unwrap()
});

/// Jobs that exceeded the configured timeout.
pub static JOB_TIMEOUTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("archivist_job_timeouts_total", "Jobs aborted by timeout"),
        &["stage"],
    )
    .unwrap()
});

// =============================================================================
// Object Metrics
// =============================================================================

/// Objects frozen by source.
pub static OBJECTS_FROZEN: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("archivist_objects_frozen_total", "Total object freezes"),
        &["source"], // "automatic", "manual"
    )
    .unwrap()
});

/// Objects released from a freeze.
pub static OBJECTS_UNFROZEN: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("archivist_objects_unfrozen_total", "Total object unfreezes").unwrap()
});

// =============================================================================
// Archive Sync Metrics
// =============================================================================

/// Archive verdicts picked up by the processed-SIP sync.
pub static PROCESSED_SIPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "archivist_processed_sips_total",
            "Archive verdicts enqueued for confirmation",
        ),
        &["status"], // "accepted", "rejected"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Dispatch
        Box::new(JOBS_ENQUEUED.clone()),
        // Stages
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(JOB_TIMEOUTS.clone()),
        // Objects
        Box::new(OBJECTS_FROZEN.clone()),
        Box::new(OBJECTS_UNFROZEN.clone()),
        // Archive
        Box::new(PROCESSED_SIPS.clone()),
    ]
}
