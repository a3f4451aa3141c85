//! FreshnessScheduler - the context handed to request paths
//!
//! Request paths never wait on background work: `trigger_*` calls return as
//! soon as the work is submitted, and their failures only reach the log.
//! `force_refresh` is the one awaited path and reports its failure.

use crate::application::enqueue::{validate_subject_key, EnqueueService};
use crate::application::handlers::{run_inline, HandlerContext, HandlerError};
use crate::application::supervisor::BackgroundSupervisor;
use crate::application::watcher::Watcher;
use crate::domain::{FreshnessPolicy, JobKind, Tier};
use crate::error::{AppError, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Result of a forced refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForceRefreshOutcome {
    /// Records written by the inline Reliable tier refresh
    pub records: usize,
    /// Slow tier jobs newly created
    pub enqueued: usize,
}

#[derive(Clone)]
pub struct FreshnessScheduler {
    enqueue: Arc<EnqueueService>,
    watcher: Arc<Watcher>,
    handlers: Arc<HandlerContext>,
    policy: FreshnessPolicy,
    supervisor: BackgroundSupervisor,
    inline_timeout: Duration,
}

impl FreshnessScheduler {
    pub fn new(
        enqueue: Arc<EnqueueService>,
        watcher: Arc<Watcher>,
        handlers: Arc<HandlerContext>,
        policy: FreshnessPolicy,
        supervisor: BackgroundSupervisor,
        inline_timeout: Duration,
    ) -> Self {
        Self {
            enqueue,
            watcher,
            handlers,
            policy,
            supervisor,
            inline_timeout,
        }
    }

    pub async fn enqueue_if_needed(&self, kind: JobKind, subject_key: &str) -> Result<bool> {
        self.enqueue.enqueue_if_needed(kind, subject_key).await
    }

    /// Evaluate the given tickers in the background
    pub fn trigger_ticker_refresh(&self, subject_keys: Vec<String>) -> JoinHandle<()> {
        let watcher = Arc::clone(&self.watcher);
        self.supervisor.submit("ticker-refresh", async move {
            watcher.enqueue_ticker_jobs(&subject_keys).await
        })
    }

    /// Force a Slow tier rebuild for the given tickers in the background
    pub fn trigger_slow_refresh(&self, subject_keys: Vec<String>) -> JoinHandle<()> {
        let watcher = Arc::clone(&self.watcher);
        self.supervisor.submit("slow-refresh", async move {
            watcher.enqueue_slow_data_jobs(&subject_keys).await
        })
    }

    /// Refresh every Reliable tier component of `subject_key` inline, then
    /// queue a forced Slow tier rebuild.
    ///
    /// Fails if any inline refresh fails or the inline phase exceeds the
    /// configured timeout. A failure to queue the Slow tier is logged only.
    pub async fn force_refresh(&self, subject_key: &str) -> Result<ForceRefreshOutcome> {
        let subject_key = validate_subject_key(subject_key)?;

        let ctx = self.handlers.as_ref();
        let inline = self
            .policy
            .components_in(Tier::Reliable)
            .map(|component| run_inline(ctx, JobKind::for_component(component), subject_key));

        let results = tokio::time::timeout(self.inline_timeout, join_all(inline))
            .await
            .map_err(|_| {
                AppError::Refresh(HandlerError::Transient(format!(
                    "inline refresh of {} exceeded {} ms",
                    subject_key,
                    self.inline_timeout.as_millis()
                )))
            })?;

        let mut records = 0;
        for result in results {
            records += result?.len();
        }

        let enqueued = match self
            .watcher
            .enqueue_slow_data_jobs(&[subject_key.to_string()])
            .await
        {
            Ok(n) => n,
            Err(e) => {
                warn!(subject_key = %subject_key, error = %e, "Slow tier enqueue after force refresh failed");
                0
            }
        };

        info!(subject_key = %subject_key, records, enqueued, "Force refresh done");
        Ok(ForceRefreshOutcome { records, enqueued })
    }
}
