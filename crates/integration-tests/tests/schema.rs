//! Schema Invalidator and schema-aware re-derivation

mod common;

use common::{Harness, T0};
use freshness_core::application::{SchemaCheck, SchemaInvalidator};
use freshness_core::domain::{Component, FreshnessPolicy, JobKind, JobState};
use freshness_core::port::data_provider::mocks::MockDataProvider;
use freshness_core::port::{DerivedDataStore, DerivedRecord, SchemaStore, StockIndexRepository};
use serde_json::json;

fn invalidator(h: &Harness, version: i64) -> SchemaInvalidator {
    SchemaInvalidator::new(h.schema_store.clone(), h.derived.clone(), version)
}

async fn seed(h: &Harness, subject: &str, schema_version: i64) {
    for component in Component::ALL {
        h.derived
            .write(
                &DerivedRecord::new(subject, component, json!({"seeded": true})),
                schema_version,
            )
            .await
            .unwrap();
    }
    h.stamp_all(subject, T0, schema_version).await;
}

#[tokio::test]
async fn test_first_run_records_version() {
    let h = Harness::new(MockDataProvider::new_success()).await;

    assert_eq!(invalidator(&h, 1).reconcile().await.unwrap(), SchemaCheck::FirstRun);
    assert_eq!(h.schema_store.load_version().await.unwrap(), Some(1));
    assert_eq!(invalidator(&h, 1).reconcile().await.unwrap(), SchemaCheck::Unchanged);
}

#[tokio::test]
async fn test_upgrade_purges_slow_tier_only() {
    let h = Harness::new(MockDataProvider::new_success()).await;
    invalidator(&h, 1).reconcile().await.unwrap();
    seed(&h, "AAPL", 1).await;
    seed(&h, "MSFT", 1).await;

    let check = invalidator(&h, 2).reconcile().await.unwrap();
    assert_eq!(check, SchemaCheck::Upgraded { from: 1, purged: 6 });
    assert_eq!(h.schema_store.load_version().await.unwrap(), Some(2));

    for component in [Component::FilingsDocuments, Component::News, Component::Signals] {
        assert!(h.derived_payload("AAPL", component).await.is_none());
    }
    for component in [Component::Quotes, Component::Fundamentals, Component::FilingsIndex] {
        assert!(h.derived_payload("AAPL", component).await.is_some());
    }
}

#[tokio::test]
async fn test_downgrade_leaves_data_and_version() {
    let h = Harness::new(MockDataProvider::new_success()).await;
    invalidator(&h, 3).reconcile().await.unwrap();
    seed(&h, "AAPL", 3).await;

    let check = invalidator(&h, 2).reconcile().await.unwrap();
    assert_eq!(check, SchemaCheck::Downgraded { from: 3 });
    assert_eq!(h.schema_store.load_version().await.unwrap(), Some(3));
    assert!(h.derived_payload("AAPL", Component::News).await.is_some());
}

#[tokio::test]
async fn test_needs_rederive_only_for_outdated_slow_components() {
    let h = Harness::new(MockDataProvider::new_success()).await;
    h.stamp_all("AAPL", T0, 1).await;
    let entry = h.stock_index.get("AAPL").await.unwrap().unwrap();

    let current = invalidator(&h, 2);
    assert!(current.needs_rederive(&entry, Component::Signals));
    assert!(!current.needs_rederive(&entry, Component::Fundamentals));
    assert!(!invalidator(&h, 1).needs_rederive(&entry, Component::Signals));
}

#[tokio::test]
async fn test_upgrade_end_to_end_rederives_from_scratch() {
    let h = Harness::new(MockDataProvider::new_success()).await;
    invalidator(&h, 1).reconcile().await.unwrap();
    seed(&h, "AAPL", 1).await;

    // New build starts with schema 2
    invalidator(&h, 2).reconcile().await.unwrap();
    let watcher = h.watcher(FreshnessPolicy::default(), 2);
    let created = watcher
        .enqueue_ticker_jobs(&["AAPL".to_string()])
        .await
        .unwrap();
    assert_eq!(created, 3);

    let executor = h.start_executor(2);
    assert!(h.wait_for_count(JobState::Complete, 3).await);
    executor.stop().await;

    let requests = h.provider.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| !r.had_existing));

    let entry = h.stock_index.get("AAPL").await.unwrap().unwrap();
    assert_eq!(entry.stamp(Component::News).unwrap().schema_version, 2);
    assert_eq!(entry.stamp(Component::Fundamentals).unwrap().schema_version, 1);

    // Everything is current under schema 2 now
    assert_eq!(
        watcher
            .enqueue_ticker_jobs(&["AAPL".to_string()])
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_rederive_reuses_valid_value_unless_forced() {
    let h = Harness::new(MockDataProvider::new_success()).await;
    seed(&h, "AAPL", 1).await;

    h.enqueue.enqueue_if_needed(JobKind::RecomputeSignals, "AAPL").await.unwrap();
    let executor = h.start_executor(1);
    h.wait_for_job_state(JobKind::RecomputeSignals, "AAPL", JobState::Complete)
        .await;

    h.enqueue.enqueue_forced(JobKind::RecomputeSignals, "AAPL").await.unwrap();
    assert!(h.wait_for_count(JobState::Complete, 2).await);
    executor.stop().await;

    let had_existing: Vec<bool> = h.provider.requests().iter().map(|r| r.had_existing).collect();
    assert_eq!(had_existing, vec![true, false]);
}
