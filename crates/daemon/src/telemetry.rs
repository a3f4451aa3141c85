//! Logging and optional OpenTelemetry export
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `freshness=info`)
//! - `FRESHNESS_LOG_FORMAT`: `pretty` (default) or `json`
//! - `FRESHNESS_LOG_DIR`: also write daily-rolling log files here
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (needs the `telemetry` feature)
//! - `OTEL_SERVICE_NAME`: service name (default: freshness-scheduler)

use crate::config::LogFormat;
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::Layered, layer::SubscriberExt, util::SubscriberInitExt, Layer,
    Registry,
};

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

const LOG_FILE_PREFIX: &str = "freshness-scheduler.log";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// life of the process.
pub fn init_logging(format: &LogFormat, log_dir: Option<&str>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("freshness=info"))
        .context("Failed to create env filter")?;

    let mut layers: Vec<BoxedLayer> = Vec::new();

    match format {
        // Production: JSON structured logging
        LogFormat::Json => layers.push(fmt::layer().json().boxed()),
        // Development: Pretty formatting with colors
        LogFormat::Pretty => layers.push(fmt::layer().pretty().boxed()),
    }

    let guard = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(fmt::layer().with_writer(writer).with_ansi(false).boxed());
            Some(guard)
        }
        None => None,
    };

    if let Some(otel) = otel_layer()? {
        layers.push(otel);
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(feature = "telemetry")]
fn otel_layer() -> Result<Option<BoxedLayer>> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;

    let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
        return Ok(None);
    };
    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "freshness-scheduler".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("Failed to build OTLP exporter")?;

    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .build();
    let tracer = provider.tracer(service_name);
    opentelemetry::global::set_tracer_provider(provider);

    Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer).boxed()))
}

#[cfg(not(feature = "telemetry"))]
fn otel_layer() -> Result<Option<BoxedLayer>> {
    if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        // Subscriber is not installed yet; stderr is the only channel
        eprintln!("OTEL_EXPORTER_OTLP_ENDPOINT set but feature 'telemetry' not enabled");
    }
    Ok(None)
}
