//! Daemon configuration from `FRESHNESS_*` environment variables
//!
//! Unset variables fall back to the scheduler defaults; set but unparseable
//! values are an error rather than silently ignored.

use anyhow::{anyhow, Context, Result};
use freshness_core::application::SchedulerConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.freshness/scheduler.db";
const DEFAULT_PROVIDER_URL: &str = "http://127.0.0.1:8700";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// SQLite URL handed to the pool
    pub database_url: String,
    /// Database file, when configured as a plain path
    pub db_file: Option<PathBuf>,
    pub provider_url: String,
    /// Tickers evaluated once at startup, before the first periodic scan
    pub watchlist: Vec<String>,
    pub log_format: LogFormat,
    pub log_dir: Option<String>,
    pub scheduler: SchedulerConfig,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SchedulerConfig::default();

        let db_path = lookup("FRESHNESS_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let (database_url, db_file) = if db_path.starts_with("sqlite:") {
            (db_path, None)
        } else {
            let expanded = shellexpand::tilde(&db_path).into_owned();
            (format!("sqlite://{}", expanded), Some(PathBuf::from(expanded)))
        };

        let log_format = match lookup("FRESHNESS_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(anyhow!(
                    "FRESHNESS_LOG_FORMAT must be 'pretty' or 'json', got {:?}",
                    other
                ))
            }
        };

        let scheduler = SchedulerConfig {
            light_workers: parse_or(&lookup, "FRESHNESS_LIGHT_WORKERS", defaults.light_workers)?,
            heavy_limit: parse_or(&lookup, "FRESHNESS_HEAVY_LIMIT", defaults.heavy_limit)?,
            max_attempts: parse_or(&lookup, "FRESHNESS_MAX_ATTEMPTS", defaults.max_attempts)?,
            retry_base_delay_ms: parse_or(
                &lookup,
                "FRESHNESS_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay_ms,
            )?,
            watch_interval: Duration::from_secs(parse_or(
                &lookup,
                "FRESHNESS_WATCH_INTERVAL_SECS",
                defaults.watch_interval.as_secs(),
            )?),
            schema_version: parse_or(&lookup, "FRESHNESS_SCHEMA_VERSION", defaults.schema_version)?,
            ..defaults
        };

        scheduler
            .validate()
            .map_err(|e| anyhow!("invalid scheduler configuration: {}", e))?;

        let watchlist: Vec<String> = lookup("FRESHNESS_WATCHLIST")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            db_file,
            provider_url: lookup("FRESHNESS_PROVIDER_URL")
                .unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string()),
            watchlist,
            log_format,
            log_dir: lookup("FRESHNESS_LOG_DIR").filter(|d| !d.trim().is_empty()),
            scheduler,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has invalid value {:?}", key, raw)),
    }
}
