//! Watcher - turns stale Stock Index entries into jobs
//!
//! Two entry points:
//! - `enqueue_ticker_jobs`: TTL/schema/dependency driven, Reliable + Slow tiers
//! - `enqueue_slow_data_jobs`: force refresh of every Slow tier component
//!
//! Both go through the Dedup/Enqueue Layer, so repeated calls never stack
//! duplicate work.

use crate::application::enqueue::EnqueueService;
use crate::application::worker::ShutdownToken;
use crate::domain::{
    stock_index, FreshnessPolicy, JobKind, SchemaVersion, Staleness, SubjectGrouper, Tier,
};
use crate::error::Result;
use crate::port::{StockIndexRepository, TimeProvider};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

pub struct Watcher {
    enqueue: Arc<EnqueueService>,
    stock_index: Arc<dyn StockIndexRepository>,
    policy: FreshnessPolicy,
    grouper: Arc<dyn SubjectGrouper>,
    time_provider: Arc<dyn TimeProvider>,
    schema_version: SchemaVersion,
}

impl Watcher {
    pub fn new(
        enqueue: Arc<EnqueueService>,
        stock_index: Arc<dyn StockIndexRepository>,
        policy: FreshnessPolicy,
        grouper: Arc<dyn SubjectGrouper>,
        time_provider: Arc<dyn TimeProvider>,
        schema_version: SchemaVersion,
    ) -> Self {
        Self {
            enqueue,
            stock_index,
            policy,
            grouper,
            time_provider,
            schema_version,
        }
    }

    /// Enqueue a job for every stale Reliable/Slow component of each subject.
    ///
    /// Groupable components are enqueued once per group key. Individual
    /// enqueue failures are logged and skipped; only a failed Stock Index read
    /// is returned as an error. Returns the number of jobs created.
    pub async fn enqueue_ticker_jobs(&self, subject_keys: &[String]) -> Result<usize> {
        let subjects = normalize(subject_keys);
        if subjects.is_empty() {
            return Ok(0);
        }

        let entries = self.stock_index.get_many(&subjects).await?;
        let now = self.time_provider.now_millis();

        let mut targets: Vec<(JobKind, String, Staleness)> = Vec::new();
        let mut seen: HashSet<(JobKind, String)> = HashSet::new();

        for subject in &subjects {
            let entry = entries.get(subject);
            for component in self.policy.scheduled_components() {
                let rule = self.policy.rule(component);
                let staleness =
                    stock_index::evaluate(entry, component, &rule, now, self.schema_version);
                if !staleness.is_stale() {
                    continue;
                }

                let target = if rule.groupable {
                    self.grouper.group_key(subject)
                } else {
                    subject.clone()
                };
                let kind = JobKind::for_component(component);
                if seen.insert((kind, target.clone())) {
                    targets.push((kind, target, staleness));
                }
            }
        }

        let mut created = 0;
        for (kind, target, staleness) in targets {
            match self.enqueue.enqueue_if_needed(kind, &target).await {
                Ok(true) => {
                    debug!(kind = %kind, subject_key = %target, reason = ?staleness, "Stale component enqueued");
                    created += 1;
                }
                Ok(false) => {}
                Err(e) => warn!(
                    kind = %kind,
                    subject_key = %target,
                    error = %e,
                    "Enqueue failed, will retry on next scan"
                ),
            }
        }

        info!(subjects = subjects.len(), created, "Ticker freshness scan done");
        Ok(created)
    }

    /// Enqueue a forced rebuild of every Slow tier component, ignoring TTLs.
    ///
    /// Empty subject keys are dropped up front. Returns the number of jobs created.
    pub async fn enqueue_slow_data_jobs(&self, subject_keys: &[String]) -> Result<usize> {
        let subjects = normalize(subject_keys);
        if subjects.is_empty() {
            debug!("No subjects for slow data refresh");
            return Ok(0);
        }

        let mut created = 0;
        for subject in &subjects {
            for component in self.policy.components_in(Tier::Slow) {
                let kind = JobKind::for_component(component);
                match self.enqueue.enqueue_forced(kind, subject).await {
                    Ok(true) => created += 1,
                    Ok(false) => {}
                    Err(e) => warn!(
                        kind = %kind,
                        subject_key = %subject,
                        error = %e,
                        "Forced enqueue failed"
                    ),
                }
            }
        }

        info!(subjects = subjects.len(), created, "Slow data refresh enqueued");
        Ok(created)
    }

    /// Evaluate every subject known to the Stock Index
    pub async fn scan_known_subjects(&self) -> Result<usize> {
        let subjects = self.stock_index.list_subjects().await?;
        self.enqueue_ticker_jobs(&subjects).await
    }

    /// Periodic scan loop; the scan in progress is abandoned on shutdown
    pub async fn run(&self, period: Duration, mut shutdown: ShutdownToken) {
        info!(period_secs = period.as_secs(), "Watcher started");
        let mut tick = interval(period);

        loop {
            tokio::select! {
                _ = tick.tick() => {},
                _ = shutdown.wait() => break,
            }

            tokio::select! {
                res = self.scan_known_subjects() => {
                    if let Err(e) = res {
                        warn!(error = %e, "Periodic freshness scan failed");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Freshness scan cancelled by shutdown");
                    break;
                }
            }
        }

        info!("Watcher stopped");
    }
}

/// Trimmed, non-empty, first-occurrence order
fn normalize(subject_keys: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    subject_keys
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_drops_empty_and_duplicates() {
        let input = vec![
            "AAPL".to_string(),
            "".to_string(),
            "  ".to_string(),
            " AAPL ".to_string(),
            "MSFT".to_string(),
        ];
        assert_eq!(normalize(&input), vec!["AAPL".to_string(), "MSFT".to_string()]);
    }
}
