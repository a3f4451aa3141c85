// Scheduler configuration

use super::worker::constants::*;
use crate::domain::SchemaVersion;
use crate::error::{AppError, Result};
use std::time::Duration;

/// Tuning knobs for the scheduler, built once at startup
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Concurrent light jobs (the worker pool size)
    pub light_workers: usize,
    /// Concurrent heavy jobs, strictly smaller than `light_workers`
    pub heavy_limit: usize,
    pub max_attempts: i32,
    pub retry_base_delay_ms: i64,
    pub idle_sleep: Duration,
    pub cleanup_timeout: Duration,
    pub drain_grace: Duration,
    pub watch_interval: Duration,
    pub inline_refresh_timeout: Duration,
    pub schema_version: SchemaVersion,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            light_workers: DEFAULT_LIGHT_WORKERS,
            heavy_limit: DEFAULT_HEAVY_LIMIT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            idle_sleep: IDLE_SLEEP_DURATION,
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
            drain_grace: DEFAULT_DRAIN_GRACE,
            watch_interval: DEFAULT_WATCH_INTERVAL,
            inline_refresh_timeout: DEFAULT_INLINE_REFRESH_TIMEOUT,
            schema_version: DEFAULT_SCHEMA_VERSION,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.light_workers == 0 {
            return Err(AppError::Config("light_workers must be at least 1".into()));
        }
        if self.heavy_limit == 0 {
            return Err(AppError::Config("heavy_limit must be at least 1".into()));
        }
        if self.heavy_limit >= self.light_workers {
            return Err(AppError::Config(format!(
                "heavy_limit ({}) must be smaller than light_workers ({})",
                self.heavy_limit, self.light_workers
            )));
        }
        if self.max_attempts < 1 {
            return Err(AppError::Config("max_attempts must be at least 1".into()));
        }
        if self.retry_base_delay_ms < 0 {
            return Err(AppError::Config("retry_base_delay_ms must not be negative".into()));
        }
        if self.schema_version < 1 {
            return Err(AppError::Config("schema_version must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        tokio_test::assert_ok!(SchedulerConfig::default().validate());
    }

    #[test]
    fn test_heavy_limit_must_be_strictly_smaller() {
        let config = SchedulerConfig {
            light_workers: 2,
            heavy_limit: 2,
            ..Default::default()
        };
        let err = tokio_test::assert_err!(config.validate());
        assert!(err.to_string().contains("smaller"));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = SchedulerConfig {
            max_attempts: 0,
            ..Default::default()
        };
        tokio_test::assert_err!(config.validate());
    }
}
