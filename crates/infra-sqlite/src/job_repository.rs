// SQLite JobRepository Implementation

use crate::error::{corrupt_row, map_sqlx_error};
use async_trait::async_trait;
use freshness_core::domain::{Job, JobClass, JobId, JobKind, JobState};
use freshness_core::error::{AppError, Result};
use freshness_core::port::JobRepository;
use sqlx::SqlitePool;
use tracing::debug;

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert_if_absent(&self, job: &Job) -> Result<bool> {
        // The partial unique index turns a second active insert into a no-op
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO jobs (
                id, kind, subject_key, class, state, force,
                attempts, max_attempts, created_at, started_at,
                completed_at, not_before, last_error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.kind.as_str())
        .bind(&job.subject_key)
        .bind(job.class.as_str())
        .bind(job.state.as_str())
        .bind(job.force)
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.not_before)
        .bind(&job.last_error)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_forced(&self, kind: JobKind, subject_key: &str) -> Result<bool> {
        // A pending job picks the flag up directly; a running one already chose
        // whether to reuse the prior value, so the request waits for it to resolve
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET force = CASE WHEN state = 'PENDING' THEN 1 ELSE force END,
                force_followup = CASE WHEN state = 'RUNNING' THEN 1 ELSE force_followup END
            WHERE kind = ? AND subject_key = ? AND force = 0
              AND state IN ('PENDING', 'RUNNING')
            "#,
        )
        .bind(kind.as_str())
        .bind(subject_key)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let upgraded = result.rows_affected() > 0;
        if upgraded {
            debug!(kind = %kind, subject_key = %subject_key, "Active job marked for forced rebuild");
        }
        Ok(upgraded)
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn find_active(&self, kind: JobKind, subject_key: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            WHERE kind = ? AND subject_key = ? AND state IN ('PENDING', 'RUNNING')
            "#,
        )
        .bind(kind.as_str())
        .bind(subject_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn claim_next(&self, class: JobClass, now_millis: i64) -> Result<Option<Job>> {
        // Single statement: two claimers can never get the same row
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET state = 'RUNNING', started_at = ?, not_before = NULL
            WHERE id = (
                SELECT id FROM jobs
                WHERE class = ? AND state = 'PENDING'
                  AND (not_before IS NULL OR not_before <= ?)
                ORDER BY created_at ASC, id ASC
                LIMIT 1
            )
            AND state = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(now_millis)
        .bind(class.as_str())
        .bind(now_millis)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn resolve(&self, job: &Job) -> Result<()> {
        let requeued = job.state == JobState::Pending;
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // A parked force request folds into a requeued job, or survives the
        // terminal row as the returned flag
        let followup: Option<bool> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET state = ?, attempts = ?, started_at = ?, completed_at = ?,
                not_before = ?, last_error = ?,
                force = CASE WHEN ? THEN MAX(force, force_followup) ELSE force END,
                force_followup = CASE WHEN ? THEN 0 ELSE force_followup END
            WHERE id = ? AND state = 'RUNNING'
            RETURNING force_followup
            "#,
        )
        .bind(job.state.as_str())
        .bind(job.attempts)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.not_before)
        .bind(&job.last_error)
        .bind(requeued)
        .bind(requeued)
        .bind(&job.id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let Some(followup) = followup else {
            // Release the connection before looking the job up
            tx.rollback().await.map_err(map_sqlx_error)?;
            let current: Option<String> = sqlx::query_scalar("SELECT state FROM jobs WHERE id = ?")
                .bind(&job.id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            return match current {
                None => Err(AppError::NotFound(format!("Job {} not found", job.id))),
                Some(state) => Err(AppError::InvalidState(format!(
                    "Cannot resolve job {} from {} to {}",
                    job.id, state, job.state
                ))),
            };
        };

        if followup {
            // Same transaction: the slot freed above cannot be taken in between
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO jobs (
                    id, kind, subject_key, class, state, force,
                    attempts, max_attempts, created_at
                )
                SELECT id || '-forced', kind, subject_key, class, 'PENDING', 1,
                       0, max_attempts, ?
                FROM jobs WHERE id = ?
                "#,
            )
            .bind(job.completed_at.unwrap_or(job.created_at))
            .bind(&job.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            debug!(job_id = %job.id, kind = %job.kind, subject_key = %job.subject_key, "Forced follow-up job enqueued");
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn reset_running(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'PENDING', started_at = NULL, not_before = NULL,
                attempts = attempts + 1,
                force = MAX(force, force_followup), force_followup = 0
            WHERE state = 'RUNNING'
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn count_by_state(&self, state: JobState) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE state = ?")
            .bind(state.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }

    async fn find_by_state(&self, state: JobState) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE state = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    kind: String,
    subject_key: String,
    class: String,
    state: String,
    force: bool,
    attempts: i32,
    max_attempts: i32,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    not_before: Option<i64>,
    last_error: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let kind = JobKind::parse(&self.kind).ok_or_else(|| corrupt_row("job kind", &self.kind))?;
        let class =
            JobClass::parse(&self.class).ok_or_else(|| corrupt_row("job class", &self.class))?;
        let state =
            JobState::parse(&self.state).ok_or_else(|| corrupt_row("job state", &self.state))?;

        Ok(Job {
            id: self.id,
            kind,
            subject_key: self.subject_key,
            class,
            state,
            force: self.force,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            not_before: self.not_before,
            last_error: self.last_error,
        })
    }
}
