// SQLite DerivedDataStore Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use freshness_core::domain::{Component, SchemaVersion};
use freshness_core::error::Result;
use freshness_core::port::{DerivedDataStore, DerivedRecord};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

pub struct SqliteDerivedStore {
    pool: SqlitePool,
}

impl SqliteDerivedStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DerivedDataStore for SqliteDerivedStore {
    async fn get(&self, subject_key: &str, component: Component) -> Result<Option<DerivedRecord>> {
        let payload: Option<String> = sqlx::query_scalar(
            "SELECT payload FROM derived_data WHERE subject_key = ? AND component = ?",
        )
        .bind(subject_key)
        .bind(component.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        payload
            .map(|raw| -> Result<DerivedRecord> {
                Ok(DerivedRecord::new(
                    subject_key,
                    component,
                    serde_json::from_str(&raw)?,
                ))
            })
            .transpose()
    }

    async fn write(&self, record: &DerivedRecord, schema_version: SchemaVersion) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO derived_data (subject_key, component, payload, schema_version)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(subject_key, component) DO UPDATE SET
                payload = excluded.payload,
                schema_version = excluded.schema_version
            "#,
        )
        .bind(&record.subject_key)
        .bind(record.component.as_str())
        .bind(serde_json::to_string(&record.payload)?)
        .bind(schema_version)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn clear(&self, subject_key: &str, component: Component) -> Result<bool> {
        let result = sqlx::query("DELETE FROM derived_data WHERE subject_key = ? AND component = ?")
            .bind(subject_key)
            .bind(component.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge(&self, components: &[Component]) -> Result<u64> {
        if components.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM derived_data WHERE component IN (");
        let mut separated = builder.separated(", ");
        for component in components {
            separated.push_bind(component.as_str());
        }
        separated.push_unseparated(")");

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
