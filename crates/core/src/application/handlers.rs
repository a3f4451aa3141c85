//! Job handlers - one per job kind, looked up in a static table
//!
//! Every handler follows the same write ordering: derived data is written
//! first, the Stock Index stamp is advanced second. A crash in between leaves
//! the component stale, never falsely fresh. Discarding runs the other way
//! round: the stamp goes first, then the derived value.

use crate::application::schema::needs_rederive;
use crate::domain::{Component, Job, JobKind, SchemaVersion, Tier};
use crate::error::AppError;
use crate::port::{
    DataProvider, DerivedDataStore, DerivedRecord, FetchRequest, ProviderError,
    StockIndexRepository, TimeProvider,
};
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Handler failure, classified for the retry policy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("permanent: {0}")]
    Permanent(String),

    #[error("storage: {0}")]
    Storage(String),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, HandlerError::Permanent(_))
    }
}

impl From<ProviderError> for HandlerError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Transient(msg) => HandlerError::Transient(msg),
            ProviderError::Permanent(msg) => HandlerError::Permanent(msg),
        }
    }
}

impl From<AppError> for HandlerError {
    fn from(err: AppError) -> Self {
        HandlerError::Storage(err.to_string())
    }
}

pub type HandlerResult = Result<Vec<DerivedRecord>, HandlerError>;

/// Everything a handler may touch
pub struct HandlerContext {
    pub stock_index: Arc<dyn StockIndexRepository>,
    pub derived: Arc<dyn DerivedDataStore>,
    pub provider: Arc<dyn DataProvider>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub schema_version: SchemaVersion,
}

pub type HandlerFn = for<'a> fn(&'a HandlerContext, &'a Job) -> BoxFuture<'a, HandlerResult>;

/// Static dispatch table. Adding a kind means adding a variant and an arm here.
pub fn handler_for(kind: JobKind) -> HandlerFn {
    match kind {
        JobKind::RefreshQuotes => refresh_source_boxed,
        JobKind::RefreshFundamentals => refresh_source_boxed,
        JobKind::RefreshFilingIndex => refresh_source_boxed,
        JobKind::RefreshFilingDocuments => rederive_boxed,
        JobKind::RefreshNews => rederive_boxed,
        JobKind::RecomputeSignals => rederive_boxed,
    }
}

/// Run the handler for (kind, subject_key) without a persisted job
pub async fn run_inline(ctx: &HandlerContext, kind: JobKind, subject_key: &str) -> HandlerResult {
    let job = Job::new(
        format!("inline-{}-{}", kind, subject_key),
        ctx.time_provider.now_millis(),
        kind,
        subject_key,
        1,
    )
    .with_force(true);
    (handler_for(kind))(ctx, &job).await
}

fn refresh_source_boxed<'a>(ctx: &'a HandlerContext, job: &'a Job) -> BoxFuture<'a, HandlerResult> {
    Box::pin(refresh_source(ctx, job))
}

fn rederive_boxed<'a>(ctx: &'a HandlerContext, job: &'a Job) -> BoxFuture<'a, HandlerResult> {
    Box::pin(rederive(ctx, job))
}

/// Fast/Reliable tier: re-fetch the source and store it
async fn refresh_source(ctx: &HandlerContext, job: &Job) -> HandlerResult {
    let component = job.kind.component();
    let records = ctx
        .provider
        .fetch(FetchRequest {
            component,
            subject_key: job.subject_key.clone(),
            existing: None,
        })
        .await?;

    persist(ctx, component, records).await
}

/// Slow tier: derive from source, reusing the previous value only when it is
/// still valid under the current schema and no rebuild was forced
async fn rederive(ctx: &HandlerContext, job: &Job) -> HandlerResult {
    let component = job.kind.component();
    debug_assert_eq!(component.tier(), Tier::Slow);

    let existing = prior_value(ctx, job, component).await?;
    let records = ctx
        .provider
        .fetch(FetchRequest {
            component,
            subject_key: job.subject_key.clone(),
            existing,
        })
        .await?;

    persist(ctx, component, records).await
}

async fn prior_value(
    ctx: &HandlerContext,
    job: &Job,
    component: Component,
) -> Result<Option<DerivedRecord>, HandlerError> {
    if job.force {
        // Until the rebuild lands the component must read as missing, or a
        // failed rebuild would leave it looking fresh with nothing behind it
        ctx.stock_index.invalidate(&job.subject_key, component).await?;
        let cleared = ctx.derived.clear(&job.subject_key, component).await?;
        info!(
            job_id = %job.id,
            component = %component,
            subject_key = %job.subject_key,
            cleared,
            "Forced rebuild, existing derived value discarded"
        );
        return Ok(None);
    }

    let entry = ctx.stock_index.get(&job.subject_key).await?;
    let outdated = entry
        .as_ref()
        .is_some_and(|e| needs_rederive(e, component, ctx.schema_version));
    if outdated {
        ctx.derived.clear(&job.subject_key, component).await?;
        info!(
            job_id = %job.id,
            component = %component,
            subject_key = %job.subject_key,
            schema_version = ctx.schema_version,
            "Schema advanced, re-deriving from scratch"
        );
        return Ok(None);
    }

    Ok(ctx.derived.get(&job.subject_key, component).await?)
}

async fn persist(
    ctx: &HandlerContext,
    component: Component,
    records: Vec<DerivedRecord>,
) -> HandlerResult {
    for record in &records {
        if record.component != component {
            return Err(HandlerError::Permanent(format!(
                "provider returned {} record for {} refresh",
                record.component, component
            )));
        }
    }

    for record in &records {
        ctx.derived.write(record, ctx.schema_version).await?;
        ctx.stock_index
            .advance(
                &record.subject_key,
                component,
                ctx.time_provider.now_millis(),
                ctx.schema_version,
            )
            .await?;
    }

    debug!(component = %component, records = records.len(), "Derived data persisted");
    Ok(records)
}
