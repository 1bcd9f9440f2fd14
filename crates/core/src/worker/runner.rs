//! Worker pool implementation.
//!
//! Runs the configured number of polling loops per stage queue plus the
//! periodic processed-SIP synchronisation:
//! - Stage loops: claim, run under the object's lock, complete/retry/fail
//! - Sync loop: asks the archive for verdicts and enqueues confirmations

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::config::{Config, WorkersConfig};
use crate::metrics;
use crate::queue::{Job, JobId, JobQueue, QueueError, Stage, StageCounts};
use crate::workflow::{StageOutcome, Workflow, WorkflowError};

use super::ObjectLocks;

/// Runtime settings of the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub workers: WorkersConfig,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    /// Claims before an infrastructure error parks the job as failed.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// `None` disables the sync loop.
    pub sync_interval: Option<Duration>,
    pub sync_days: u32,
    /// How long `stop` waits for loops to finish their current job.
    pub shutdown_grace: Duration,
}

impl From<&Config> for WorkerSettings {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.workers.clone(),
            poll_interval: Duration::from_millis(config.queue.poll_interval_ms),
            job_timeout: Duration::from_secs(config.queue.job_timeout_secs),
            max_attempts: config.queue.max_attempts,
            retry_delay: Duration::from_secs(config.queue.retry_delay_secs),
            sync_interval: match config.archive.sync_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            sync_days: config.archive.sync_days,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// How a claimed job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JobResult {
    Completed { outcome: StageOutcome },
    /// Infrastructure error; the job is back in its queue.
    Retried { error: String },
    /// Parked in the failed state.
    Failed { error: String },
}

impl JobResult {
    /// Label used for the job result metric.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed {
                outcome: StageOutcome::Frozen { .. },
            } => "frozen",
            Self::Completed { .. } => "completed",
            Self::Retried { .. } => "retried",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Report of one executed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub stage: Stage,
    pub attempts: u32,
    pub result: JobResult,
}

/// Current status of the worker pool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStatus {
    /// Whether the pool's loops are running.
    pub running: bool,
    /// Jobs executing right now.
    pub active_jobs: usize,
    /// Objects whose lock is held or awaited.
    pub locked_objects: usize,
    /// Queue depth per stage.
    pub queues: Vec<StageCounts>,
}

/// State shared by every loop of the pool.
struct WorkerContext {
    workflow: Arc<Workflow>,
    queue: Arc<dyn JobQueue>,
    audit: Option<AuditHandle>,
    settings: WorkerSettings,
    locks: ObjectLocks,
    active_jobs: AtomicUsize,
}

impl WorkerContext {
    async fn run_next(&self, stage: Stage) -> Result<Option<JobReport>, QueueError> {
        match self.queue.claim(stage).await? {
            Some(job) => Ok(Some(self.run_claimed(job).await?)),
            None => Ok(None),
        }
    }

    async fn run_claimed(&self, job: Job) -> Result<JobReport, QueueError> {
        let stage = job.stage();
        let object_id = job.payload.object_id();

        let _object_guard = match object_id {
            Some(id) => Some(self.locks.acquire(id).await),
            None => None,
        };

        debug!(job_id = %job.id, attempt = job.attempts, "Running job");
        self.active_jobs.fetch_add(1, Ordering::SeqCst);
        let timer = metrics::JOB_DURATION
            .with_label_values(&[stage.queue_name()])
            .start_timer();

        let result = match tokio::time::timeout(
            self.settings.job_timeout,
            self.workflow.run_job(&job.payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                metrics::JOB_TIMEOUTS
                    .with_label_values(&[stage.queue_name()])
                    .inc();
                Err(WorkflowError::Timeout {
                    stage,
                    secs: self.settings.job_timeout.as_secs(),
                })
            }
        };

        timer.observe_duration();
        self.active_jobs.fetch_sub(1, Ordering::SeqCst);

        let result = match result {
            Ok(outcome) => {
                self.queue.complete(&job.id).await?;
                debug!(job_id = %job.id, "Job completed");
                JobResult::Completed { outcome }
            }
            Err(e) if e.is_retryable() && job.attempts < self.settings.max_attempts => {
                let message = e.to_string();
                warn!(
                    job_id = %job.id,
                    attempt = job.attempts,
                    max_attempts = self.settings.max_attempts,
                    "Job failed, will retry: {}",
                    message
                );
                self.queue
                    .retry(&job.id, &message, self.settings.retry_delay)
                    .await?;
                JobResult::Retried { error: message }
            }
            Err(e) => {
                let message = e.to_string();
                error!(job_id = %job.id, attempt = job.attempts, "Job failed: {}", message);
                self.queue.fail(&job.id, &message).await?;
                if let Some(ref audit) = self.audit {
                    audit
                        .emit(AuditEvent::JobFailed {
                            job_id: job.id.to_string(),
                            stage: stage.queue_name().to_string(),
                            object_id,
                            attempts: job.attempts,
                            error: message.clone(),
                        })
                        .await;
                }
                JobResult::Failed { error: message }
            }
        };

        metrics::JOBS_TOTAL
            .with_label_values(&[stage.queue_name(), result.label()])
            .inc();

        Ok(JobReport {
            job_id: job.id,
            stage,
            attempts: job.attempts,
            result,
        })
    }
}

/// Pool of background workers serving the stage queues.
pub struct WorkerPool {
    context: Arc<WorkerContext>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a new worker pool. Nothing runs until [`WorkerPool::start`].
    pub fn new(
        settings: WorkerSettings,
        workflow: Arc<Workflow>,
        audit: Option<AuditHandle>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let queue = Arc::clone(workflow.dispatcher().queue());

        Self {
            context: Arc::new(WorkerContext {
                workflow,
                queue,
                audit,
                settings,
                locks: ObjectLocks::new(),
                active_jobs: AtomicUsize::new(0),
            }),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the pool (spawns background tasks).
    pub async fn start(&self) -> Result<(), QueueError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker pool already running");
            return Ok(());
        }

        info!("Starting worker pool");

        // Jobs left running by a previous process would otherwise block their ids forever
        let recovered = self.context.queue.recover_running().await?;
        if recovered > 0 {
            info!(recovered, "Requeued jobs interrupted by the previous shutdown");
        }

        let mut tasks = Vec::new();
        for stage in Stage::ALL {
            for index in 0..self.context.settings.workers.count_for(stage) {
                tasks.push(self.spawn_stage_loop(stage, index));
            }
        }
        if let Some(interval) = self.context.settings.sync_interval {
            tasks.push(self.spawn_sync_loop(interval));
        }

        let spawned = tasks.len();
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(tasks);

        info!(loops = spawned, "Worker pool started");
        Ok(())
    }

    /// Stop the pool gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker pool not running");
            return;
        }

        info!("Stopping worker pool");

        // Signal shutdown to all loops
        let _ = self.shutdown_tx.send(());

        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        let grace = self.context.settings.shutdown_grace;
        if tokio::time::timeout(grace, futures::future::join_all(tasks))
            .await
            .is_err()
        {
            warn!(
                grace_secs = grace.as_secs(),
                "Workers still busy after grace period; their jobs will be recovered on restart"
            );
        }

        info!("Worker pool stopped");
    }

    /// Claim and run one job of a stage in the calling task.
    ///
    /// Returns `None` when the stage has nothing runnable.
    pub async fn run_next(&self, stage: Stage) -> Result<Option<JobReport>, QueueError> {
        self.context.run_next(stage).await
    }

    /// Get current pool status.
    pub async fn status(&self) -> WorkerStatus {
        WorkerStatus {
            running: self.running.load(Ordering::Relaxed),
            active_jobs: self.context.active_jobs.load(Ordering::Relaxed),
            locked_objects: self.context.locks.len(),
            queues: self.context.queue.counts().await.unwrap_or_default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Spawn one polling loop for a stage queue.
    fn spawn_stage_loop(&self, stage: Stage, index: usize) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let context = Arc::clone(&self.context);
        let poll_interval = context.settings.poll_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(stage = %stage, worker = index, "Stage worker started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(stage = %stage, worker = index, "Stage worker received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(poll_interval) => {
                        // Drain the queue before sleeping again
                        while running.load(Ordering::Relaxed) {
                            match context.run_next(stage).await {
                                Ok(Some(_)) => continue,
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(stage = %stage, "Queue error: {}", e);
                                    break;
                                }
                            }
                        }
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                }
            }
            info!(stage = %stage, worker = index, "Stage worker stopped");
        })
    }

    /// Spawn the periodic processed-SIP synchronisation.
    fn spawn_sync_loop(&self, interval: Duration) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let context = Arc::clone(&self.context);
        let days = context.settings.sync_days;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Processed SIP sync loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Processed SIP sync loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        match context.workflow.sync_processed_sips(days).await {
                            Ok(report) => debug!(
                                accepted = report.accepted,
                                rejected = report.rejected,
                                enqueued = report.enqueued,
                                "Processed SIPs synced"
                            ),
                            Err(e) => warn!("Processed SIP sync failed: {}", e),
                        }
                    }
                }
            }
            info!("Processed SIP sync loop stopped");
        })
    }
}
