//! SQLite-backed job queue.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::store::{format_timestamp, parse_timestamp};

use super::{
    Job, JobId, JobPayload, JobQueue, JobState, QueueError, Stage, StageCounts, SubmitOutcome,
};

const JOB_COLUMNS: &str =
    "job_id, payload, state, attempts, last_error, enqueued_at, run_after";

/// Job queue persisted in a `jobs` table keyed by job id.
pub struct SqliteJobQueue {
    conn: Mutex<Connection>,
}

impl SqliteJobQueue {
    /// Open the queue in an existing or new database file.
    pub fn new(path: &Path) -> Result<Self, QueueError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory queue (useful for testing).
    pub fn in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                job_id TEXT PRIMARY KEY,
                stage TEXT NOT NULL,
                object_id INTEGER,
                payload TEXT NOT NULL,
                state TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                enqueued_at TEXT NOT NULL,
                run_after TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_stage_state ON jobs(stage, state, run_after);
            CREATE INDEX IF NOT EXISTS idx_jobs_object_id ON jobs(object_id);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Backend("connection lock poisoned".to_string()))
    }

    fn object_ids_in_states(&self, states: &[JobState]) -> Result<HashSet<i64>, QueueError> {
        let conn = self.lock()?;
        let placeholders = vec!["?"; states.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT object_id FROM jobs WHERE object_id IS NOT NULL AND state IN ({})",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(
                rusqlite::params_from_iter(states.iter().map(|s| s.as_str())),
                |row| row.get::<_, i64>(0),
            )?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }
}

fn row_to_job(row: &Row) -> rusqlite::Result<Job> {
    let payload_json: String = row.get(1)?;
    let payload: JobPayload = serde_json::from_str(&payload_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    let state: String = row.get(2)?;
    let state = JobState::parse(&state).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown job state: {}", state).into(),
        )
    })?;

    Ok(Job {
        id: JobId::from(row.get::<_, String>(0)?),
        payload,
        state,
        attempts: row.get(3)?,
        last_error: row.get(4)?,
        enqueued_at: parse_timestamp(row, 5)?,
        run_after: parse_timestamp(row, 6)?,
    })
}

fn after(delay: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero())
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn submit(&self, id: &JobId, payload: &JobPayload) -> Result<SubmitOutcome, QueueError> {
        let payload_json = serde_json::to_string(payload)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        let now = format_timestamp(&Utc::now());

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "DELETE FROM jobs WHERE job_id = ?1 AND state = 'failed'",
            params![id.as_str()],
        )?;
        let existing = tx
            .query_row(
                "SELECT state, payload FROM jobs WHERE job_id = ?1",
                params![id.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let outcome = match existing {
            None => {
                tx.execute(
                    "INSERT INTO jobs \
                     (job_id, stage, object_id, payload, state, attempts, enqueued_at, run_after) \
                     VALUES (?1, ?2, ?3, ?4, 'queued', 0, ?5, ?5)",
                    params![
                        id.as_str(),
                        payload.stage().queue_name(),
                        payload.object_id(),
                        payload_json,
                        now
                    ],
                )?;
                SubmitOutcome::Accepted
            }
            Some((_, existing_payload)) if existing_payload == payload_json => {
                SubmitOutcome::AlreadyActive
            }
            Some((state, _)) if state == JobState::Queued.as_str() => {
                // The newest payload wins, e.g. the packaging job of a newer run
                tx.execute(
                    "UPDATE jobs SET payload = ?2, attempts = 0, last_error = NULL, run_after = ?3 \
                     WHERE job_id = ?1",
                    params![id.as_str(), payload_json, now],
                )?;
                SubmitOutcome::Replaced
            }
            Some(_) => return Err(QueueError::JobRunning(id.to_string())),
        };
        tx.commit()?;

        Ok(outcome)
    }

    async fn claim(&self, stage: Stage) -> Result<Option<Job>, QueueError> {
        let now = format_timestamp(&Utc::now());

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let sql = format!(
            "SELECT {} FROM jobs WHERE stage = ?1 AND state = 'queued' AND run_after <= ?2 \
             ORDER BY run_after ASC, enqueued_at ASC, rowid ASC LIMIT 1",
            JOB_COLUMNS
        );
        let job = tx
            .query_row(&sql, params![stage.queue_name(), now], row_to_job)
            .optional()?;

        let Some(mut job) = job else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE jobs SET state = 'running', attempts = attempts + 1 WHERE job_id = ?1",
            params![job.id.as_str()],
        )?;
        tx.commit()?;

        job.state = JobState::Running;
        job.attempts += 1;
        Ok(Some(job))
    }

    async fn complete(&self, id: &JobId) -> Result<(), QueueError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM jobs WHERE job_id = ?1", params![id.as_str()])?;
        Ok(())
    }

    async fn retry(&self, id: &JobId, error: &str, delay: Duration) -> Result<(), QueueError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE jobs SET state = 'queued', last_error = ?2, run_after = ?3 WHERE job_id = ?1",
            params![id.as_str(), error, format_timestamp(&after(delay))],
        )?;
        Ok(())
    }

    async fn fail(&self, id: &JobId, error: &str) -> Result<(), QueueError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE jobs SET state = 'failed', last_error = ?2 WHERE job_id = ?1",
            params![id.as_str(), error],
        )?;
        Ok(())
    }

    async fn delete_jobs_for_object(&self, object_id: i64) -> Result<usize, QueueError> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM jobs WHERE object_id = ?1 AND state != 'running'",
            params![object_id],
        )?;
        Ok(deleted)
    }

    async fn enqueued_object_ids(&self) -> Result<HashSet<i64>, QueueError> {
        self.object_ids_in_states(&[JobState::Queued, JobState::Running, JobState::Failed])
    }

    async fn running_object_ids(&self) -> Result<HashSet<i64>, QueueError> {
        self.object_ids_in_states(&[JobState::Running])
    }

    async fn list(
        &self,
        stage: Option<Stage>,
        state: Option<JobState>,
        limit: usize,
    ) -> Result<Vec<Job>, QueueError> {
        let conn = self.lock()?;

        let mut conditions = Vec::new();
        let mut query_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(stage) = stage {
            conditions.push("stage = ?");
            query_params.push(Box::new(stage.queue_name()));
        }
        if let Some(state) = state {
            conditions.push("state = ?");
            query_params.push(Box::new(state.as_str()));
        }
        query_params.push(Box::new(limit as i64));

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM jobs {} ORDER BY enqueued_at ASC, rowid ASC LIMIT ?",
            JOB_COLUMNS, where_clause
        );

        let param_refs: Vec<&dyn rusqlite::ToSql> =
            query_params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(param_refs.as_slice(), row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    async fn counts(&self) -> Result<Vec<StageCounts>, QueueError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT stage, state, COUNT(*) FROM jobs GROUP BY stage, state")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts: Vec<StageCounts> = Stage::ALL.into_iter().map(StageCounts::empty).collect();
        for (stage, state, count) in rows {
            let (Some(stage), Some(state)) = (Stage::parse(&stage), JobState::parse(&state)) else {
                continue;
            };
            if let Some(entry) = counts.iter_mut().find(|c| c.stage == stage) {
                let count = count as u64;
                match state {
                    JobState::Queued => entry.queued = count,
                    JobState::Running => entry.running = count,
                    JobState::Failed => entry.failed = count,
                }
            }
        }
        Ok(counts)
    }

    async fn recover_running(&self) -> Result<usize, QueueError> {
        let conn = self.lock()?;
        let recovered = conn.execute("UPDATE jobs SET state = 'queued' WHERE state = 'running'", [])?;
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download(object_id: i64) -> JobPayload {
        JobPayload::Download {
            object_id,
            sip_id: None,
        }
    }

    #[tokio::test]
    async fn test_submit_merges_active_job() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        let id = JobId::for_object(Stage::Download, 1);

        assert_eq!(
            queue.submit(&id, &download(1)).await.unwrap(),
            SubmitOutcome::Accepted
        );
        assert_eq!(
            queue.submit(&id, &download(1)).await.unwrap(),
            SubmitOutcome::AlreadyActive
        );

        let jobs = queue.list(None, None, 10).await.unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn test_running_job_blocks_submit_until_complete() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        let id = JobId::for_object(Stage::Download, 1);
        queue.submit(&id, &download(1)).await.unwrap();

        let claimed = queue.claim(Stage::Download).await.unwrap().unwrap();
        assert_eq!(claimed.state, JobState::Running);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(
            queue.submit(&id, &download(1)).await.unwrap(),
            SubmitOutcome::AlreadyActive
        );

        queue.complete(&id).await.unwrap();
        assert_eq!(
            queue.submit(&id, &download(1)).await.unwrap(),
            SubmitOutcome::Accepted
        );
    }

    fn package(sip_id: &str) -> JobPayload {
        JobPayload::Package {
            object_id: 1,
            sip_id: sip_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_different_payload_replaces_queued_job() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        let id = JobId::for_object(Stage::Package, 1);
        queue.submit(&id, &package("20190203-120000")).await.unwrap();

        assert_eq!(
            queue.submit(&id, &package("20190203-131515")).await.unwrap(),
            SubmitOutcome::Replaced
        );

        let claimed = queue.claim(Stage::Package).await.unwrap().unwrap();
        assert_eq!(claimed.payload, package("20190203-131515"));
        assert_eq!(claimed.attempts, 1);
    }

    #[tokio::test]
    async fn test_different_payload_is_refused_while_running() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        let id = JobId::for_object(Stage::Package, 1);
        queue.submit(&id, &package("20190203-120000")).await.unwrap();
        queue.claim(Stage::Package).await.unwrap().unwrap();

        let err = queue
            .submit(&id, &package("20190203-131515"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::JobRunning(ref job_id) if job_id == "package_1"));

        // The running job keeps its payload
        let jobs = queue.list(None, None, 10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].payload, package("20190203-120000"));
        assert_eq!(jobs[0].state, JobState::Running);
    }

    #[tokio::test]
    async fn test_failed_job_is_replaced() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        let id = JobId::for_object(Stage::Download, 1);
        queue.submit(&id, &download(1)).await.unwrap();
        queue.claim(Stage::Download).await.unwrap();
        queue.fail(&id, "boom").await.unwrap();

        assert_eq!(
            queue.submit(&id, &download(1)).await.unwrap(),
            SubmitOutcome::Accepted
        );
        let jobs = queue.list(None, Some(JobState::Queued), 10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].last_error.is_none());
    }

    #[tokio::test]
    async fn test_claim_respects_stage_and_delay() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        let id = JobId::for_object(Stage::Download, 1);
        queue.submit(&id, &download(1)).await.unwrap();

        assert!(queue.claim(Stage::Package).await.unwrap().is_none());

        queue.claim(Stage::Download).await.unwrap().unwrap();
        queue
            .retry(&id, "database unavailable", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(queue.claim(Stage::Download).await.unwrap().is_none());

        queue.retry(&id, "again", Duration::ZERO).await.unwrap();
        let job = queue.claim(Stage::Download).await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(job.last_error.as_deref(), Some("again"));
    }

    #[tokio::test]
    async fn test_object_id_sets_and_delete() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        for object_id in [1, 2] {
            queue
                .submit(&JobId::for_object(Stage::Download, object_id), &download(object_id))
                .await
                .unwrap();
        }
        queue
            .submit(&JobId::for_object(Stage::Download, 3), &download(3))
            .await
            .unwrap();
        queue.claim(Stage::Download).await.unwrap();
        queue.fail(&JobId::for_object(Stage::Download, 3), "boom").await.unwrap();

        assert_eq!(
            queue.enqueued_object_ids().await.unwrap(),
            HashSet::from([1, 2, 3])
        );
        assert_eq!(queue.running_object_ids().await.unwrap(), HashSet::from([1]));

        // Running jobs are left to their worker.
        assert_eq!(queue.delete_jobs_for_object(1).await.unwrap(), 0);
        assert_eq!(queue.delete_jobs_for_object(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_counts_and_recovery() {
        let queue = SqliteJobQueue::in_memory().unwrap();
        queue
            .submit(&JobId::for_object(Stage::Download, 1), &download(1))
            .await
            .unwrap();
        queue
            .submit(&JobId::for_object(Stage::Download, 2), &download(2))
            .await
            .unwrap();
        queue.claim(Stage::Download).await.unwrap();

        let counts = queue.counts().await.unwrap();
        let download_counts = counts.iter().find(|c| c.stage == Stage::Download).unwrap();
        assert_eq!(download_counts.queued, 1);
        assert_eq!(download_counts.running, 1);

        assert_eq!(queue.recover_running().await.unwrap(), 1);
        assert!(queue.running_object_ids().await.unwrap().is_empty());
    }
}
