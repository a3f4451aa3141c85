//! Schema Invalidator
//!
//! Compares the compiled-in schema version with the one persisted by the
//! previous run. On upgrade every Slow tier derived value is purged, so the
//! next scan rebuilds them from scratch instead of resuming from data shaped
//! by the old schema.

use crate::domain::{Component, SchemaVersion, StockIndexEntry, Tier};
use crate::error::Result;
use crate::port::{DerivedDataStore, SchemaStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a startup schema check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaCheck {
    /// No version was stored; nothing to invalidate
    FirstRun,
    Unchanged,
    Upgraded { from: SchemaVersion, purged: u64 },
    /// Running an older binary against newer data. Nothing is purged and the
    /// stored version is kept.
    Downgraded { from: SchemaVersion },
}

pub struct SchemaInvalidator {
    schema_store: Arc<dyn SchemaStore>,
    derived: Arc<dyn DerivedDataStore>,
    current: SchemaVersion,
}

impl SchemaInvalidator {
    pub fn new(
        schema_store: Arc<dyn SchemaStore>,
        derived: Arc<dyn DerivedDataStore>,
        current: SchemaVersion,
    ) -> Self {
        Self {
            schema_store,
            derived,
            current,
        }
    }

    pub fn current_version(&self) -> SchemaVersion {
        self.current
    }

    /// Run once at startup, before the Watcher's first scan
    pub async fn reconcile(&self) -> Result<SchemaCheck> {
        let stored = self.schema_store.load_version().await?;

        let check = match stored {
            None => {
                self.schema_store.store_version(self.current).await?;
                info!(schema_version = self.current, "Schema version recorded");
                SchemaCheck::FirstRun
            }
            Some(v) if v == self.current => SchemaCheck::Unchanged,
            Some(v) if v < self.current => {
                let slow: Vec<Component> = Component::ALL
                    .into_iter()
                    .filter(|c| c.tier() == Tier::Slow)
                    .collect();
                // Purge before storing: a crash in between re-purges on next start
                let purged = self.derived.purge(&slow).await?;
                self.schema_store.store_version(self.current).await?;
                info!(
                    from = v,
                    to = self.current,
                    purged,
                    "Schema upgraded, slow tier derived data invalidated"
                );
                SchemaCheck::Upgraded { from: v, purged }
            }
            Some(v) => {
                warn!(
                    stored = v,
                    current = self.current,
                    "Stored schema version is newer than this build, leaving data untouched"
                );
                SchemaCheck::Downgraded { from: v }
            }
        };

        Ok(check)
    }

    /// Whether a component of `entry` was derived under an older schema
    pub fn needs_rederive(&self, entry: &StockIndexEntry, component: Component) -> bool {
        needs_rederive(entry, component, self.current)
    }
}

/// Slow tier values derived under a schema older than `current` are not
/// reusable. Shared by the invalidator and the re-derive handlers.
pub fn needs_rederive(entry: &StockIndexEntry, component: Component, current: SchemaVersion) -> bool {
    component.tier() == Tier::Slow && entry.schema_outdated(component, current)
}
