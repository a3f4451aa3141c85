// Freshness Infrastructure - SQLite Adapter
// Implements: JobRepository, StockIndexRepository, DerivedDataStore, SchemaStore

mod connection;
mod derived_store;
mod error;
mod job_repository;
mod migration;
mod schema_store;
mod stock_index;

pub use connection::create_pool;
pub use derived_store::SqliteDerivedStore;
pub use error::map_sqlx_error;
pub use job_repository::SqliteJobRepository;
pub use migration::run_migrations;
pub use schema_store::SqliteSchemaStore;
pub use stock_index::SqliteStockIndex;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
