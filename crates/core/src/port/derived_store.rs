// Derived Data Store Port (Interface)

use crate::domain::{Component, SchemaVersion};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One derived value for (subject, component)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedRecord {
    pub subject_key: String,
    pub component: Component,
    pub payload: serde_json::Value,
}

impl DerivedRecord {
    pub fn new(subject_key: impl Into<String>, component: Component, payload: serde_json::Value) -> Self {
        Self {
            subject_key: subject_key.into(),
            component,
            payload,
        }
    }
}

/// Storage for fetched/derived values
#[async_trait]
pub trait DerivedDataStore: Send + Sync {
    async fn get(&self, subject_key: &str, component: Component) -> Result<Option<DerivedRecord>>;

    /// Durably write (replace) a record under the given schema version
    async fn write(&self, record: &DerivedRecord, schema_version: SchemaVersion) -> Result<()>;

    /// Remove the value for one (subject, component). Returns true if one existed.
    async fn clear(&self, subject_key: &str, component: Component) -> Result<bool>;

    /// Remove every value of the given components. Returns the number removed.
    async fn purge(&self, components: &[Component]) -> Result<u64>;
}
