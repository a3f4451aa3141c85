// SQLite SchemaStore Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use freshness_core::domain::SchemaVersion;
use freshness_core::error::{AppError, Result};
use freshness_core::port::SchemaStore;
use sqlx::SqlitePool;

const SCHEMA_VERSION_KEY: &str = "derived_schema_version";

pub struct SqliteSchemaStore {
    pool: SqlitePool,
}

impl SqliteSchemaStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchemaStore for SqliteSchemaStore {
    async fn load_version(&self) -> Result<Option<SchemaVersion>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT value FROM scheduler_meta WHERE name = ?")
                .bind(SCHEMA_VERSION_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        raw.map(|v| {
            v.parse::<SchemaVersion>().map_err(|e| {
                AppError::Database(format!("Stored schema version {:?} is not a number: {}", v, e))
            })
        })
        .transpose()
    }

    async fn store_version(&self, version: SchemaVersion) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_meta (name, value) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(SCHEMA_VERSION_KEY)
        .bind(version.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    #[tokio::test]
    async fn test_version_round_trip() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = SqliteSchemaStore::new(pool);

        assert_eq!(store.load_version().await.unwrap(), None);
        store.store_version(2).await.unwrap();
        store.store_version(3).await.unwrap();
        assert_eq!(store.load_version().await.unwrap(), Some(3));
    }
}
