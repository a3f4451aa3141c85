// Executor - pending job dispatch with light/heavy concurrency budgets

pub mod constants;
mod panic_guard;
mod shutdown;

use constants::*;
pub use panic_guard::{describe_join_error, panic_message};
pub use shutdown::{
    drain_channel, shutdown_channel, DrainReporter, DrainWaiter, ShutdownManager, ShutdownSender,
    ShutdownToken,
};

use crate::application::config::SchedulerConfig;
use crate::application::handlers::{handler_for, HandlerContext, HandlerError, HandlerResult};
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{Job, JobClass};
use crate::error::{AppError, Result};
use crate::port::{JobRepository, TimeProvider};
use futures::FutureExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;
use tracing::{error, info, warn};

/// How a single handler run ended
#[derive(Debug)]
enum Outcome {
    Succeeded(usize),
    Failed(HandlerError),
    Panicked(String),
    /// Cut short by shutdown after the drain grace ran out
    Interrupted,
    /// Claimed with no attempts left; earlier runs died with the process
    Exhausted,
}

impl From<std::result::Result<HandlerResult, JoinError>> for Outcome {
    fn from(res: std::result::Result<HandlerResult, JoinError>) -> Self {
        match res {
            Ok(Ok(records)) => Outcome::Succeeded(records.len()),
            Ok(Err(e)) => Outcome::Failed(e),
            Err(join_err) => Outcome::Panicked(describe_join_error(join_err)),
        }
    }
}

/// State shared by the dispatch loop and every job task
struct Shared {
    job_repo: Arc<dyn JobRepository>,
    handlers: Arc<HandlerContext>,
    retry_policy: RetryPolicy,
    time_provider: Arc<dyn TimeProvider>,
    cleanup_timeout: Duration,
    drain_grace: Duration,
}

/// Pulls PENDING jobs and runs their handlers.
///
/// A slot from the job's class budget is taken before the job is claimed, so
/// at most `light_workers` light and `heavy_limit` heavy jobs run at once.
pub struct Executor {
    shared: Arc<Shared>,
    light_slots: Arc<Semaphore>,
    heavy_slots: Arc<Semaphore>,
    idle_sleep: Duration,
}

impl Executor {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        handlers: Arc<HandlerContext>,
        time_provider: Arc<dyn TimeProvider>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                job_repo,
                handlers,
                retry_policy: RetryPolicy::new(config.retry_base_delay_ms),
                time_provider,
                cleanup_timeout: config.cleanup_timeout,
                drain_grace: config.drain_grace,
            }),
            light_slots: Arc::new(Semaphore::new(config.light_workers)),
            heavy_slots: Arc::new(Semaphore::new(config.heavy_limit)),
            idle_sleep: config.idle_sleep,
        }
    }

    /// Dispatch until shutdown, then resolve every in-flight job and report drained
    pub async fn run(&self, mut shutdown: ShutdownToken, drained: DrainReporter) -> Result<()> {
        info!(
            light_slots = self.light_slots.available_permits(),
            heavy_slots = self.heavy_slots.available_permits(),
            "Executor started"
        );

        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            if shutdown.is_shutdown() {
                break;
            }

            // Reap finished job tasks without blocking
            while let Some(Some(res)) = in_flight.join_next().now_or_never() {
                log_task_exit(res);
            }

            match self.dispatch_ready(&mut in_flight, &shutdown).await {
                Ok(0) => {
                    tokio::select! {
                        _ = sleep(self.idle_sleep) => {},
                        _ = shutdown.wait() => break,
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Dispatch error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }

        info!(in_flight = in_flight.len(), "Executor stopped dispatching, draining");
        while let Some(res) = in_flight.join_next().await {
            log_task_exit(res);
        }

        drained.report();
        info!("Executor drained");
        Ok(())
    }

    /// Claim and spawn as many jobs as free slots allow. Returns the number dispatched.
    async fn dispatch_ready(
        &self,
        in_flight: &mut JoinSet<()>,
        shutdown: &ShutdownToken,
    ) -> Result<usize> {
        let mut dispatched = 0;

        for class in [JobClass::Heavy, JobClass::Light] {
            loop {
                let Ok(permit) = Arc::clone(self.slots(class)).try_acquire_owned() else {
                    break;
                };

                let now = self.shared.time_provider.now_millis();
                // Permit is released if nothing is claimable or the claim fails
                let Some(job) = self.shared.job_repo.claim_next(class, now).await? else {
                    break;
                };

                info!(
                    job_id = %job.id,
                    kind = %job.kind,
                    subject_key = %job.subject_key,
                    attempt = job.attempts + 1,
                    "Dispatching job"
                );

                let shared = Arc::clone(&self.shared);
                in_flight.spawn(shared.run_job(job, shutdown.clone(), permit));
                dispatched += 1;
            }
        }

        Ok(dispatched)
    }

    fn slots(&self, class: JobClass) -> &Arc<Semaphore> {
        match class {
            JobClass::Light => &self.light_slots,
            JobClass::Heavy => &self.heavy_slots,
        }
    }
}

impl Shared {
    async fn run_job(
        self: Arc<Self>,
        job: Job,
        mut shutdown: ShutdownToken,
        _permit: OwnedSemaphorePermit,
    ) {
        let started = Instant::now();

        if job.attempts >= job.max_attempts {
            self.resolve(job, Outcome::Exhausted, started.elapsed(), &mut shutdown)
                .await;
            return;
        }

        // Handler runs in its own task so a panic cannot take the executor down
        let handlers = Arc::clone(&self.handlers);
        let handler_job = job.clone();
        let mut handle = tokio::spawn(async move {
            (handler_for(handler_job.kind))(handlers.as_ref(), &handler_job).await
        });

        let outcome = tokio::select! {
            res = &mut handle => Outcome::from(res),
            _ = shutdown.wait() => {
                info!(
                    job_id = %job.id,
                    grace_ms = self.drain_grace.as_millis() as u64,
                    "Shutdown while job running, waiting for handler"
                );
                match tokio::time::timeout(self.drain_grace, &mut handle).await {
                    Ok(res) => Outcome::from(res),
                    Err(_) => {
                        handle.abort();
                        Outcome::Interrupted
                    }
                }
            }
        };

        self.resolve(job, outcome, started.elapsed(), &mut shutdown)
            .await;
    }

    /// Apply the outcome and persist it.
    ///
    /// Each write is bounded by `cleanup_timeout`. Failed writes are retried
    /// with capped backoff until they land or shutdown starts; once draining,
    /// the job gets one more write and is otherwise left to startup recovery.
    /// The job's slot stays taken while retrying.
    async fn resolve(
        &self,
        mut job: Job,
        outcome: Outcome,
        elapsed: Duration,
        shutdown: &mut ShutdownToken,
    ) {
        let now = self.time_provider.now_millis();
        let elapsed_ms = elapsed.as_millis() as u64;

        let transition = match outcome {
            Outcome::Succeeded(records) => {
                info!(job_id = %job.id, kind = %job.kind, records, elapsed_ms, "Job completed");
                job.complete(now)
            }
            Outcome::Failed(err) => {
                job.attempts += 1;
                match self.retry_policy.decide(&job, &err) {
                    RetryDecision::Retry(delay_ms) => {
                        info!(
                            job_id = %job.id,
                            attempt = job.attempts,
                            delay_ms,
                            error = %err,
                            "Retrying job after failure"
                        );
                        job.requeue(Some(now + delay_ms), Some(err.to_string()))
                    }
                    RetryDecision::Failed => {
                        error!(job_id = %job.id, attempts = job.attempts, error = %err, "Job failed");
                        job.fail(now, err.to_string())
                    }
                }
            }
            Outcome::Panicked(reason) => {
                job.attempts += 1;
                error!(job_id = %job.id, reason = %reason, "Job handler did not return");
                job.fail(now, format!("handler {}", reason))
            }
            Outcome::Interrupted => {
                warn!(job_id = %job.id, elapsed_ms, "Job interrupted by shutdown, returning to queue");
                job.requeue(None, Some("interrupted by shutdown".to_string()))
            }
            Outcome::Exhausted => {
                error!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    "Job has no attempts left after unclean shutdowns"
                );
                job.fail(now, "attempts exhausted by unclean shutdowns")
            }
        };

        if let Err(e) = transition {
            error!(job_id = %job.id, error = %e, "Invalid job transition");
            return;
        }

        let mut delay = RESOLVE_RETRY_BASE_DELAY;
        loop {
            let failure = match tokio::time::timeout(self.cleanup_timeout, self.job_repo.resolve(&job)).await {
                Ok(Ok(())) => return,
                Ok(Err(e @ AppError::Database(_))) => e.to_string(),
                Ok(Err(e)) => {
                    // Not a storage hiccup; another write would fail the same way
                    error!(job_id = %job.id, state = %job.state, error = %e, "Job resolution rejected");
                    return;
                }
                Err(_) => format!("timed out after {} ms", self.cleanup_timeout.as_millis()),
            };

            if shutdown.is_shutdown() {
                error!(
                    job_id = %job.id,
                    state = %job.state,
                    error = %failure,
                    "Failed to persist job resolution; startup recovery will requeue it"
                );
                return;
            }

            warn!(
                job_id = %job.id,
                state = %job.state,
                error = %failure,
                retry_in_ms = delay.as_millis() as u64,
                "Failed to persist job resolution, retrying"
            );
            tokio::select! {
                _ = sleep(delay) => {},
                _ = shutdown.wait() => {},
            }
            delay = (delay * 2).min(RESOLVE_RETRY_MAX_DELAY);
        }
    }
}

fn log_task_exit(res: std::result::Result<(), JoinError>) {
    if let Err(join_err) = res {
        error!(reason = %describe_join_error(join_err), "Job task ended abnormally");
    }
}
