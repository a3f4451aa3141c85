//! Freshness Scheduler - Main Entry Point
//! Composition root: storage, recovery, Executor + Watcher, graceful drain

mod config;
mod provider;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use config::DaemonConfig;
use freshness_core::application::handlers::HandlerContext;
use freshness_core::application::{
    drain_channel, shutdown_channel, BackgroundSupervisor, EnqueueService, Executor,
    FreshnessScheduler, RecoveryService, SchemaInvalidator, ShutdownManager, Watcher,
};
use freshness_core::domain::{ExchangeSuffixGrouper, FreshnessPolicy};
use freshness_core::port::id_provider::UuidProvider;
use freshness_core::port::time_provider::SystemTimeProvider;
use freshness_core::port::{
    DataProvider, DerivedDataStore, IdProvider, JobRepository, SchemaStore, StockIndexRepository,
    TimeProvider,
};
use freshness_infra_sqlite::{
    create_pool, run_migrations, SqliteDerivedStore, SqliteJobRepository, SqliteSchemaStore,
    SqliteStockIndex,
};
use provider::HttpJsonProvider;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extra time the ShutdownManager allows on top of drain grace and cleanup
const SHUTDOWN_SLACK: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration, then logging
    let config = DaemonConfig::from_env()?;
    let _log_guard = telemetry::init_logging(&config.log_format, config.log_dir.as_deref())?;

    info!("Freshness Scheduler v{} starting...", VERSION);

    // 2. Initialize database
    if let Some(parent) = config.db_file.as_ref().and_then(|f| f.parent()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!(database_url = %config.database_url, "Initializing database...");

    let pool = create_pool(&config.database_url)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 3. Setup dependencies (DI wiring)
    let scheduler_config = config.scheduler.clone();
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let id_provider: Arc<dyn IdProvider> = Arc::new(UuidProvider);
    let job_repo: Arc<dyn JobRepository> = Arc::new(SqliteJobRepository::new(pool.clone()));
    let stock_index: Arc<dyn StockIndexRepository> = Arc::new(SqliteStockIndex::new(pool.clone()));
    let derived: Arc<dyn DerivedDataStore> = Arc::new(SqliteDerivedStore::new(pool.clone()));
    let schema_store: Arc<dyn SchemaStore> = Arc::new(SqliteSchemaStore::new(pool.clone()));
    let data_provider: Arc<dyn DataProvider> = Arc::new(
        HttpJsonProvider::new(config.provider_url.clone())
            .context("Data provider setup failed")?,
    );

    // 4. Schema check, before anything reads derived data
    let invalidator = SchemaInvalidator::new(
        schema_store,
        Arc::clone(&derived),
        scheduler_config.schema_version,
    );
    let check = invalidator.reconcile().await.context("Schema check failed")?;
    info!(outcome = ?check, "Schema check completed");

    // 5. Crash recovery, before the Executor claims anything
    info!("Running crash recovery...");
    match RecoveryService::new(Arc::clone(&job_repo))
        .recover_orphaned_jobs()
        .await
    {
        Ok(count) => info!(recovered_jobs = count, "Crash recovery completed"),
        Err(e) => error!(error = %e, "Crash recovery failed"),
    }

    let policy = FreshnessPolicy::default();
    let enqueue = Arc::new(EnqueueService::new(
        Arc::clone(&job_repo),
        id_provider,
        Arc::clone(&time_provider),
        scheduler_config.max_attempts,
    ));
    let handlers = Arc::new(HandlerContext {
        stock_index: Arc::clone(&stock_index),
        derived,
        provider: data_provider,
        time_provider: Arc::clone(&time_provider),
        schema_version: scheduler_config.schema_version,
    });
    let watcher = Arc::new(Watcher::new(
        Arc::clone(&enqueue),
        stock_index,
        policy.clone(),
        Arc::new(ExchangeSuffixGrouper),
        Arc::clone(&time_provider),
        scheduler_config.schema_version,
    ));
    let scheduler = FreshnessScheduler::new(
        enqueue,
        Arc::clone(&watcher),
        Arc::clone(&handlers),
        policy,
        BackgroundSupervisor::new(),
        scheduler_config.inline_refresh_timeout,
    );

    // 6. Start Executor
    info!("Starting executor...");
    let (shutdown_tx, shutdown_token) = shutdown_channel();
    let (drain_reporter, drain_waiter) = drain_channel();

    let executor = Executor::new(job_repo, handlers, time_provider, &scheduler_config);
    let executor_token = shutdown_token.clone();
    let executor_handle = tokio::spawn(async move {
        if let Err(e) = executor.run(executor_token, drain_reporter).await {
            error!(error = %e, "Executor failed");
        }
    });

    // 7. Start Watcher
    let watch_interval = scheduler_config.watch_interval;
    let watcher_token = shutdown_token.clone();
    let watcher_handle = tokio::spawn({
        let watcher = Arc::clone(&watcher);
        async move { watcher.run(watch_interval, watcher_token).await }
    });

    if !config.watchlist.is_empty() {
        info!(subjects = config.watchlist.len(), "Seeding watchlist");
        let _ = scheduler.trigger_ticker_refresh(config.watchlist.clone());
    }

    info!("System ready. Press Ctrl+C to shutdown");

    // 8. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Draining...");

    // 9. Graceful shutdown, bounded
    let bound =
        scheduler_config.drain_grace + scheduler_config.cleanup_timeout + SHUTDOWN_SLACK;
    let manager = ShutdownManager::new(shutdown_tx, drain_waiter, bound);
    if !manager.shutdown().await {
        warn!("Executor did not drain in time");
    }

    let _ = tokio::time::timeout(SHUTDOWN_SLACK, watcher_handle).await;
    let _ = tokio::time::timeout(SHUTDOWN_SLACK, executor_handle).await;
    pool.close().await;

    info!("Shutdown complete.");
    Ok(())
}
