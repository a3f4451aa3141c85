// Worker constants (no magic values)
use std::time::Duration;

/// Default light-job worker pool size
pub const DEFAULT_LIGHT_WORKERS: usize = 8;

/// Default heavy-job concurrency limit (must stay below the light pool)
pub const DEFAULT_HEAVY_LIMIT: usize = 2;

/// Default attempts before a transiently failing job is failed
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Default retry base delay (1000ms = 1s)
pub const DEFAULT_RETRY_BASE_DELAY_MS: i64 = 1000;

/// Sleep duration when no jobs are available (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after a dispatch error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Bound on each job-resolution write issued during shutdown or after a handler returns
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// First pause before retrying a failed job-resolution write (100ms)
pub const RESOLVE_RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Cap on the pause between job-resolution write retries (5s)
pub const RESOLVE_RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// How long a running handler may keep going after shutdown is signalled
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(3);

/// Watcher scan interval (5 minutes)
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Bound on each inline force-refresh handler
pub const DEFAULT_INLINE_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

/// Initial schema version for derived data
pub const DEFAULT_SCHEMA_VERSION: i64 = 1;
