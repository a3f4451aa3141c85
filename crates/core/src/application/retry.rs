// Retry logic for failed handler runs
use crate::application::handlers::HandlerError;
use crate::domain::Job;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Return the job to PENDING, dispatchable after the backoff delay (ms)
    Retry(i64),
    /// Do not retry, job has failed permanently
    Failed,
}

/// Retry policy
///
/// Transient and storage errors are retried until the job's attempt budget is
/// spent. Permanent errors fail on the first attempt.
pub struct RetryPolicy {
    base_delay_ms: i64,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `base_delay_ms` - Base delay in milliseconds (default: 1000)
    pub fn new(base_delay_ms: i64) -> Self {
        Self { base_delay_ms }
    }

    /// Decide what happens to a job whose handler just failed.
    ///
    /// `job.attempts` must already include the failed attempt.
    ///
    /// Backoff formula:
    /// delay = base_delay * 2 ^ (attempts - 1) * (1.0 ± 0.1)
    pub fn decide(&self, job: &Job, error: &HandlerError) -> RetryDecision {
        if !error.is_retryable() {
            warn!(
                job_id = %job.id,
                error = %error,
                "Non-retryable failure"
            );
            return RetryDecision::Failed;
        }

        if job.attempts >= job.max_attempts {
            warn!(
                job_id = %job.id,
                attempts = %job.attempts,
                max_attempts = %job.max_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::Failed;
        }

        let exponent = (job.attempts - 1).clamp(0, 16);
        let base_delay_ms = self.base_delay_ms as f64 * 2f64.powi(exponent);

        // ±10% jitter seeded by job.id so retries of different jobs spread out
        let jitter_seed = job.id.chars().map(|c| c as u32).sum::<u32>();
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        let delay_ms = (base_delay_ms * jitter_factor) as i64;

        info!(
            job_id = %job.id,
            attempt = %job.attempts,
            max_attempts = %job.max_attempts,
            delay_ms = %delay_ms,
            "Scheduling retry"
        );

        RetryDecision::Retry(delay_ms)
    }
}
