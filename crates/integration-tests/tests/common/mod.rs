//! Shared wiring for the end-to-end tests: SQLite adapters, manual clock,
//! sequential ids and the mock data provider.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use freshness_core::application::handlers::HandlerContext;
use freshness_core::application::{
    drain_channel, shutdown_channel, BackgroundSupervisor, EnqueueService, Executor,
    FreshnessScheduler, SchedulerConfig, ShutdownManager, Watcher,
};
use freshness_core::domain::{
    Component, ExchangeSuffixGrouper, FreshnessPolicy, Job, JobKind, JobState, SchemaVersion,
};
use freshness_core::port::data_provider::mocks::MockDataProvider;
use freshness_core::port::id_provider::SequentialIdProvider;
use freshness_core::port::time_provider::ManualTimeProvider;
use freshness_core::port::{DerivedDataStore, JobRepository, StockIndexRepository};
use freshness_infra_sqlite::{
    create_pool, run_migrations, SqliteDerivedStore, SqliteJobRepository, SqliteSchemaStore,
    SqliteStockIndex,
};
use sqlx::SqlitePool;
use tokio::task::JoinHandle;

/// 2024-01-01T00:00:00Z
pub const T0: i64 = 1_704_067_200_000;
pub const HOUR_MS: i64 = 60 * 60 * 1000;

pub fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        light_workers: 4,
        heavy_limit: 2,
        retry_base_delay_ms: 0,
        idle_sleep: Duration::from_millis(10),
        cleanup_timeout: Duration::from_secs(2),
        drain_grace: Duration::from_millis(100),
        inline_refresh_timeout: Duration::from_secs(2),
        ..SchedulerConfig::default()
    }
}

pub struct Harness {
    pub pool: SqlitePool,
    pub clock: Arc<ManualTimeProvider>,
    pub job_repo: Arc<SqliteJobRepository>,
    pub stock_index: Arc<SqliteStockIndex>,
    pub derived: Arc<SqliteDerivedStore>,
    pub schema_store: Arc<SqliteSchemaStore>,
    pub provider: Arc<MockDataProvider>,
    pub enqueue: Arc<EnqueueService>,
    pub config: SchedulerConfig,
}

impl Harness {
    pub async fn new(provider: MockDataProvider) -> Self {
        Self::with_config("sqlite::memory:", provider, test_config()).await
    }

    pub async fn with_config(url: &str, provider: MockDataProvider, config: SchedulerConfig) -> Self {
        let pool = create_pool(url).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let clock = Arc::new(ManualTimeProvider::new(T0));
        let job_repo = Arc::new(SqliteJobRepository::new(pool.clone()));
        let enqueue = Arc::new(EnqueueService::new(
            job_repo.clone(),
            Arc::new(SequentialIdProvider::default()),
            clock.clone(),
            config.max_attempts,
        ));

        Self {
            stock_index: Arc::new(SqliteStockIndex::new(pool.clone())),
            derived: Arc::new(SqliteDerivedStore::new(pool.clone())),
            schema_store: Arc::new(SqliteSchemaStore::new(pool.clone())),
            provider: Arc::new(provider),
            pool,
            clock,
            job_repo,
            enqueue,
            config,
        }
    }

    pub fn handlers(&self, schema_version: SchemaVersion) -> Arc<HandlerContext> {
        Arc::new(HandlerContext {
            stock_index: self.stock_index.clone(),
            derived: self.derived.clone(),
            provider: self.provider.clone(),
            time_provider: self.clock.clone(),
            schema_version,
        })
    }

    pub fn watcher(&self, policy: FreshnessPolicy, schema_version: SchemaVersion) -> Watcher {
        Watcher::new(
            self.enqueue.clone(),
            self.stock_index.clone(),
            policy,
            Arc::new(ExchangeSuffixGrouper),
            self.clock.clone(),
            schema_version,
        )
    }

    pub fn scheduler(&self, schema_version: SchemaVersion) -> FreshnessScheduler {
        let policy = FreshnessPolicy::default();
        FreshnessScheduler::new(
            self.enqueue.clone(),
            Arc::new(self.watcher(policy.clone(), schema_version)),
            self.handlers(schema_version),
            policy,
            BackgroundSupervisor::new(),
            self.config.inline_refresh_timeout,
        )
    }

    /// Start an Executor in the background
    pub fn start_executor(&self, schema_version: SchemaVersion) -> RunningExecutor {
        self.start_executor_with(self.job_repo.clone(), schema_version)
    }

    /// Start an Executor that claims and resolves through `job_repo`
    pub fn start_executor_with(
        &self,
        job_repo: Arc<dyn JobRepository>,
        schema_version: SchemaVersion,
    ) -> RunningExecutor {
        let executor = Executor::new(
            job_repo,
            self.handlers(schema_version),
            self.clock.clone(),
            &self.config,
        );
        let (sender, token) = shutdown_channel();
        let (reporter, waiter) = drain_channel();
        let handle = tokio::spawn(async move { executor.run(token, reporter).await.unwrap() });

        RunningExecutor {
            manager: ShutdownManager::new(sender, waiter, Duration::from_secs(5)),
            handle,
        }
    }

    /// Stamp every component of `subject` at `at` under `schema_version`
    pub async fn stamp_all(&self, subject: &str, at: i64, schema_version: SchemaVersion) {
        for component in Component::ALL {
            self.stock_index
                .advance(subject, component, at, schema_version)
                .await
                .unwrap();
        }
    }

    /// Most recent job for (kind, subject) in any state
    pub async fn job_for(&self, kind: JobKind, subject: &str) -> Option<Job> {
        let mut found: Vec<Job> = Vec::new();
        for state in [
            JobState::Pending,
            JobState::Running,
            JobState::Complete,
            JobState::Failed,
        ] {
            found.extend(
                self.job_repo
                    .find_by_state(state)
                    .await
                    .unwrap()
                    .into_iter()
                    .filter(|j| j.kind == kind && j.subject_key == subject),
            );
        }
        found.into_iter().max_by_key(|j| j.created_at)
    }

    pub async fn count(&self, state: JobState) -> i64 {
        self.job_repo.count_by_state(state).await.unwrap()
    }

    pub async fn active_jobs(&self) -> Vec<Job> {
        let mut jobs = self.job_repo.find_by_state(JobState::Pending).await.unwrap();
        jobs.extend(self.job_repo.find_by_state(JobState::Running).await.unwrap());
        jobs
    }

    /// Poll until `count(state) == expected`; false on timeout
    pub async fn wait_for_count(&self, state: JobState, expected: i64) -> bool {
        for _ in 0..500 {
            if self.count(state).await == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    pub async fn wait_for_job_state(&self, kind: JobKind, subject: &str, state: JobState) -> Job {
        for _ in 0..500 {
            if let Some(job) = self.job_for(kind, subject).await {
                if job.state == state {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} {} never reached {}", kind, subject, state);
    }

    pub async fn derived_payload(
        &self,
        subject: &str,
        component: Component,
    ) -> Option<serde_json::Value> {
        self.derived
            .get(subject, component)
            .await
            .unwrap()
            .map(|r| r.payload)
    }
}

pub struct RunningExecutor {
    manager: ShutdownManager,
    handle: JoinHandle<()>,
}

impl RunningExecutor {
    /// Drain and wait for the dispatch loop to exit. Returns whether it drained in time.
    pub async fn stop(self) -> bool {
        let drained = self.manager.shutdown().await;
        self.handle.await.unwrap();
        drained
    }
}
