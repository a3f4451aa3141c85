// SQLite StockIndexRepository Implementation

use crate::error::{corrupt_row, map_sqlx_error};
use async_trait::async_trait;
use freshness_core::domain::{Component, ComponentStamp, SchemaVersion, StockIndexEntry};
use freshness_core::error::Result;
use freshness_core::port::StockIndexRepository;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;

/// Keeps bound parameters well under SQLite's variable limit
const LOOKUP_CHUNK: usize = 500;

pub struct SqliteStockIndex {
    pool: SqlitePool,
}

impl SqliteStockIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StampRow {
    subject_key: String,
    component: String,
    updated_at: i64,
    schema_version: i64,
}

/// Fold stamp rows into one entry per subject
fn collect_entries(rows: Vec<StampRow>) -> Result<HashMap<String, StockIndexEntry>> {
    let mut entries: HashMap<String, StockIndexEntry> = HashMap::new();
    for row in rows {
        let component = Component::parse(&row.component)
            .ok_or_else(|| corrupt_row("component", &row.component))?;
        entries
            .entry(row.subject_key.clone())
            .or_insert_with(|| StockIndexEntry::new(row.subject_key))
            .stamps
            .insert(
                component,
                ComponentStamp {
                    updated_at: row.updated_at,
                    schema_version: row.schema_version,
                },
            );
    }
    Ok(entries)
}

#[async_trait]
impl StockIndexRepository for SqliteStockIndex {
    async fn get(&self, subject_key: &str) -> Result<Option<StockIndexEntry>> {
        let rows: Vec<StampRow> = sqlx::query_as(
            "SELECT subject_key, component, updated_at, schema_version FROM stock_index WHERE subject_key = ?",
        )
        .bind(subject_key)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(collect_entries(rows)?.remove(subject_key))
    }

    async fn get_many(&self, subject_keys: &[String]) -> Result<HashMap<String, StockIndexEntry>> {
        let mut rows: Vec<StampRow> = Vec::new();

        for chunk in subject_keys.chunks(LOOKUP_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT subject_key, component, updated_at, schema_version FROM stock_index WHERE subject_key IN (",
            );
            let mut separated = builder.separated(", ");
            for key in chunk {
                separated.push_bind(key.as_str());
            }
            separated.push_unseparated(")");

            let mut chunk_rows: Vec<StampRow> = builder
                .build_query_as()
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            rows.append(&mut chunk_rows);
        }

        collect_entries(rows)
    }

    async fn advance(
        &self,
        subject_key: &str,
        component: Component,
        updated_at: i64,
        schema_version: SchemaVersion,
    ) -> Result<()> {
        // Neither the timestamp nor the schema version moves backwards, even if
        // two refreshes finish out of order
        sqlx::query(
            r#"
            INSERT INTO stock_index (subject_key, component, updated_at, schema_version)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(subject_key, component) DO UPDATE SET
                updated_at = MAX(stock_index.updated_at, excluded.updated_at),
                schema_version = MAX(stock_index.schema_version, excluded.schema_version)
            "#,
        )
        .bind(subject_key)
        .bind(component.as_str())
        .bind(updated_at)
        .bind(schema_version)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn invalidate(&self, subject_key: &str, component: Component) -> Result<bool> {
        let result = sqlx::query("DELETE FROM stock_index WHERE subject_key = ? AND component = ?")
            .bind(subject_key)
            .bind(component.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_subjects(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT DISTINCT subject_key FROM stock_index ORDER BY subject_key")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}
