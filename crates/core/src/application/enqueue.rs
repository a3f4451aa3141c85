// Dedup/Enqueue Layer - creates a job only when none is already pending or running

use crate::domain::{Job, JobKind};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobRepository, TimeProvider};
use std::sync::Arc;
use tracing::debug;

/// Sole writer of new job records
pub struct EnqueueService {
    job_repo: Arc<dyn JobRepository>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    max_attempts: i32,
}

impl EnqueueService {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        max_attempts: i32,
    ) -> Self {
        Self {
            job_repo,
            id_provider,
            time_provider,
            max_attempts,
        }
    }

    /// Insert a pending job for (kind, subject_key) unless one is already
    /// pending or running.
    ///
    /// Returns `true` if this call created the job. On error the job may or may
    /// not exist; retrying is safe.
    pub async fn enqueue_if_needed(&self, kind: JobKind, subject_key: &str) -> Result<bool> {
        self.enqueue(kind, subject_key, false).await
    }

    /// Like [`enqueue_if_needed`](Self::enqueue_if_needed), but the job discards
    /// existing derived data before re-deriving. If a pending job already
    /// exists it is upgraded to forced; if one is running, a forced follow-up
    /// runs after it. Either way `false` is returned.
    pub async fn enqueue_forced(&self, kind: JobKind, subject_key: &str) -> Result<bool> {
        self.enqueue(kind, subject_key, true).await
    }

    async fn enqueue(&self, kind: JobKind, subject_key: &str, force: bool) -> Result<bool> {
        let subject_key = validate_subject_key(subject_key)?;

        let job = Job::new(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
            kind,
            subject_key,
            self.max_attempts,
        )
        .with_force(force);

        let created = self.job_repo.insert_if_absent(&job).await?;

        if created {
            debug!(
                job_id = %job.id,
                kind = %kind,
                subject_key = %subject_key,
                force,
                "Job enqueued"
            );
        } else {
            if force {
                self.job_repo.mark_forced(kind, subject_key).await?;
            }
            debug!(
                kind = %kind,
                subject_key = %subject_key,
                "Job already active, skipped"
            );
        }

        Ok(created)
    }
}

/// Reject empty or whitespace-only subject keys; returns the trimmed key
pub fn validate_subject_key(subject_key: &str) -> Result<&str> {
    let trimmed = subject_key.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("subject_key must not be empty".into()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_subject_key_empty() {
        let err = validate_subject_key("   ").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_validate_subject_key_trims() {
        assert_eq!(validate_subject_key(" AAPL ").unwrap(), "AAPL");
    }
}
