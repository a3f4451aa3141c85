// Schema Metadata Port (Interface)

use crate::domain::SchemaVersion;
use crate::error::Result;
use async_trait::async_trait;

/// Persisted schema version the derived data was last reconciled against
#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn load_version(&self) -> Result<Option<SchemaVersion>>;

    async fn store_version(&self, version: SchemaVersion) -> Result<()>;
}
