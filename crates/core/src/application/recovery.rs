// Startup recovery - RUNNING jobs left behind by a previous process go back to PENDING
use crate::domain::JobState;
use crate::port::JobRepository;
use std::sync::Arc;
use tracing::{info, warn};

/// Crash recovery service
///
/// Must run once at startup, before the Executor starts claiming. Every
/// RUNNING job found then was owned by a dead process.
pub struct RecoveryService {
    job_repo: Arc<dyn JobRepository>,
}

impl RecoveryService {
    pub fn new(job_repo: Arc<dyn JobRepository>) -> Self {
        Self { job_repo }
    }

    /// Reset orphaned RUNNING jobs to PENDING.
    ///
    /// The lost run counts as an attempt, so a job that keeps taking the
    /// process down runs out of attempts and is failed by the Executor
    /// instead of being dispatched again. Returns the number of jobs requeued.
    pub async fn recover_orphaned_jobs(&self) -> crate::error::Result<usize> {
        let orphaned = self.job_repo.find_by_state(JobState::Running).await?;
        if orphaned.is_empty() {
            info!("No orphaned jobs found");
            return Ok(0);
        }

        for job in &orphaned {
            let attempts = job.attempts + 1;
            if attempts >= job.max_attempts {
                warn!(
                    job_id = %job.id,
                    kind = %job.kind,
                    subject_key = %job.subject_key,
                    attempts,
                    max_attempts = job.max_attempts,
                    "Orphaned job has no attempts left and will be failed on dispatch"
                );
            } else {
                warn!(
                    job_id = %job.id,
                    kind = %job.kind,
                    subject_key = %job.subject_key,
                    started_at = ?job.started_at,
                    attempts,
                    "Requeueing orphaned job"
                );
            }
        }

        let recovered = self.job_repo.reset_running().await? as usize;
        info!(recovered_count = recovered, "Orphaned job recovery complete");
        Ok(recovered)
    }
}
