// Stock Index Port (Interface)

use crate::domain::{Component, SchemaVersion, StockIndexEntry};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Per-subject freshness ledger storage
#[async_trait]
pub trait StockIndexRepository: Send + Sync {
    /// Entry for one subject (None if never refreshed)
    async fn get(&self, subject_key: &str) -> Result<Option<StockIndexEntry>>;

    /// Entries for several subjects; absent subjects are omitted
    async fn get_many(&self, subject_keys: &[String]) -> Result<HashMap<String, StockIndexEntry>>;

    /// Record a successful refresh of one component, creating the entry on first use.
    /// Callers must have durably written the derived data first.
    async fn advance(
        &self,
        subject_key: &str,
        component: Component,
        updated_at: i64,
        schema_version: SchemaVersion,
    ) -> Result<()>;

    /// Forget the stamp of one component so it evaluates as missing.
    /// Must run before its derived value is discarded.
    async fn invalidate(&self, subject_key: &str, component: Component) -> Result<bool>;

    /// Every subject with an entry
    async fn list_subjects(&self) -> Result<Vec<String>>;
}
