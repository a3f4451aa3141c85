//! Startup recovery across a simulated process restart

mod common;

use common::{test_config, Harness, T0};
use freshness_core::application::RecoveryService;
use freshness_core::domain::{JobClass, JobKind, JobState};
use freshness_core::port::data_provider::mocks::MockDataProvider;
use freshness_core::port::JobRepository;
use tempfile::TempDir;

fn db_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("scheduler.db").display())
}

#[tokio::test]
async fn test_running_jobs_requeued_after_restart() {
    let dir = TempDir::new().unwrap();

    // First process: two jobs claimed, then the process dies
    {
        let h = Harness::with_config(&db_url(&dir), MockDataProvider::new_success(), test_config())
            .await;
        h.enqueue.enqueue_if_needed(JobKind::RefreshNews, "AAPL").await.unwrap();
        h.enqueue
            .enqueue_if_needed(JobKind::RefreshFilingIndex, "AAPL")
            .await
            .unwrap();
        h.enqueue.enqueue_if_needed(JobKind::RefreshNews, "MSFT").await.unwrap();

        h.job_repo.claim_next(JobClass::Heavy, T0).await.unwrap().unwrap();
        h.job_repo.claim_next(JobClass::Light, T0).await.unwrap().unwrap();
        assert_eq!(h.count(JobState::Running).await, 2);
        h.pool.close().await;
    }

    // Second process
    let h = Harness::with_config(&db_url(&dir), MockDataProvider::new_success(), test_config())
        .await;
    let recovered = RecoveryService::new(h.job_repo.clone())
        .recover_orphaned_jobs()
        .await
        .unwrap();

    assert_eq!(recovered, 2);
    assert_eq!(h.count(JobState::Running).await, 0);
    assert_eq!(h.count(JobState::Pending).await, 3);
    // Each lost run counts once; the never-claimed job is untouched
    let pending = h.job_repo.find_by_state(JobState::Pending).await.unwrap();
    assert!(pending.iter().all(|j| j.started_at.is_none()));
    let attempts: Vec<i32> = pending.iter().map(|j| j.attempts).collect();
    assert_eq!(attempts.iter().filter(|a| **a == 1).count(), 2);
    assert_eq!(attempts.iter().filter(|a| **a == 0).count(), 1);

    // Recovered work is picked up again
    let executor = h.start_executor(1);
    assert!(h.wait_for_count(JobState::Complete, 3).await);
    assert!(executor.stop().await);
}

#[tokio::test]
async fn test_recovery_without_orphans_is_noop() {
    let h = Harness::new(MockDataProvider::new_success()).await;
    h.enqueue.enqueue_if_needed(JobKind::RefreshNews, "AAPL").await.unwrap();

    let recovered = RecoveryService::new(h.job_repo.clone())
        .recover_orphaned_jobs()
        .await
        .unwrap();

    assert_eq!(recovered, 0);
    assert_eq!(h.count(JobState::Pending).await, 1);
}

#[tokio::test]
async fn test_recovery_keeps_dedup_intact() {
    let h = Harness::new(MockDataProvider::new_success()).await;
    h.enqueue.enqueue_if_needed(JobKind::RefreshNews, "AAPL").await.unwrap();
    h.job_repo.claim_next(JobClass::Heavy, T0).await.unwrap();

    RecoveryService::new(h.job_repo.clone())
        .recover_orphaned_jobs()
        .await
        .unwrap();

    assert!(!h.enqueue.enqueue_if_needed(JobKind::RefreshNews, "AAPL").await.unwrap());
    assert_eq!(h.active_jobs().await.len(), 1);
}
