// Port Layer - Interfaces for external dependencies

pub mod data_provider;
pub mod derived_store;
pub mod id_provider; // For deterministic testing
pub mod job_repository;
pub mod schema_store;
pub mod stock_index;
pub mod time_provider;

// Re-exports
pub use data_provider::{DataProvider, FetchRequest, ProviderError};
pub use derived_store::{DerivedDataStore, DerivedRecord};
pub use id_provider::IdProvider;
pub use job_repository::JobRepository;
pub use schema_store::SchemaStore;
pub use stock_index::StockIndexRepository;
pub use time_provider::TimeProvider;
