// Job Repository Port (Interface)

use crate::domain::{Job, JobClass, JobId, JobKind, JobState};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for Job persistence
///
/// At most one non-terminal (PENDING or RUNNING) job may exist per
/// (kind, subject_key); implementations enforce this atomically.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a pending job unless a non-terminal job already exists for its
    /// (kind, subject_key). Returns true when this call inserted the job.
    async fn insert_if_absent(&self, job: &Job) -> Result<bool>;

    /// Request a forced rebuild from the active job for (kind, subject_key).
    /// A pending job is upgraded in place. A running job keeps its own flag and
    /// gets a forced follow-up queued when it resolves (or the flag back if it is
    /// requeued). Returns false when nothing active needed upgrading.
    async fn mark_forced(&self, kind: JobKind, subject_key: &str) -> Result<bool>;

    /// Find job by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>>;

    /// Find the non-terminal job for (kind, subject_key)
    async fn find_active(&self, kind: JobKind, subject_key: &str) -> Result<Option<Job>>;

    /// Atomically move the oldest dispatchable pending job of `class` to RUNNING
    async fn claim_next(&self, class: JobClass, now_millis: i64) -> Result<Option<Job>>;

    /// Persist the resolution of a RUNNING job (complete, failed or back to pending),
    /// together with any forced follow-up requested while it ran
    async fn resolve(&self, job: &Job) -> Result<()>;

    /// Reset every RUNNING job to PENDING, counting the lost run as an attempt.
    /// Returns the number reset.
    async fn reset_running(&self) -> Result<u64>;

    /// Count jobs by state
    async fn count_by_state(&self, state: JobState) -> Result<i64>;

    /// Find all jobs by state, oldest first
    async fn find_by_state(&self, state: JobState) -> Result<Vec<Job>>;
}
