// Domain Layer - Pure business logic and entities

pub mod error;
pub mod freshness;
pub mod job;
pub mod stock_index;

// Re-exports
pub use error::DomainError;
pub use freshness::{
    Component, ExchangeSuffixGrouper, FreshnessPolicy, FreshnessRule, JobClass, SubjectGrouper,
    Tier,
};
pub use job::{Job, JobId, JobKind, JobState, SubjectKey};
pub use stock_index::{ComponentStamp, SchemaVersion, Staleness, StockIndexEntry};
