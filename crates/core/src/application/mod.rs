// Application Layer - Use Cases and Business Logic

pub mod config;
pub mod enqueue;
pub mod handlers;
pub mod recovery;
pub mod retry;
pub mod scheduler;
pub mod schema;
pub mod supervisor;
pub mod watcher;
pub mod worker;

// Re-exports
pub use config::SchedulerConfig;
pub use enqueue::EnqueueService;
pub use handlers::{HandlerContext, HandlerError};
pub use recovery::RecoveryService;
pub use scheduler::{ForceRefreshOutcome, FreshnessScheduler};
pub use schema::{SchemaCheck, SchemaInvalidator};
pub use supervisor::BackgroundSupervisor;
pub use watcher::Watcher;
pub use worker::{
    drain_channel, shutdown_channel, DrainReporter, DrainWaiter, Executor, ShutdownManager,
    ShutdownSender, ShutdownToken,
};
