// Background supervisor - detached, fire-and-forget tasks with panic/error containment

use crate::application::worker::describe_join_error;
use crate::error::Result;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Runs background work detached from the caller.
///
/// A failure or panic inside a submitted task is logged here and never reaches
/// the submitter.
#[derive(Clone, Default)]
pub struct BackgroundSupervisor {
    in_flight: Arc<AtomicUsize>,
}

impl BackgroundSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `work` detached. The returned handle never yields an error and
    /// may be dropped.
    pub fn submit<F>(&self, label: &'static str, work: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<usize>> + Send + 'static,
    {
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            // Nested spawn: a panic unwinds the inner task only
            match tokio::spawn(work).await {
                Ok(Ok(count)) => debug!(task = label, count, "Background task finished"),
                Ok(Err(e)) => warn!(task = label, error = %e, "Background task failed"),
                Err(join_err) => error!(
                    task = label,
                    reason = %describe_join_error(join_err),
                    "Background task aborted"
                ),
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        })
    }

    /// Tasks submitted and not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[tokio::test]
    async fn test_panic_is_contained() {
        let supervisor = BackgroundSupervisor::new();
        let handle = supervisor.submit("panics", async {
            if true {
                panic!("detached boom");
            }
            Ok(0)
        });
        tokio_test::assert_ok!(handle.await);
        assert_eq!(supervisor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_error_is_contained() {
        let supervisor = BackgroundSupervisor::new();
        let handle = supervisor.submit("fails", async {
            Err(AppError::Database("unavailable".into()))
        });
        tokio_test::assert_ok!(handle.await);
    }

    #[tokio::test]
    async fn test_submit_does_not_wait_for_work() {
        let supervisor = BackgroundSupervisor::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = supervisor.submit("slow", async move {
            let _ = rx.await;
            Ok(1)
        });
        assert_eq!(supervisor.in_flight(), 1);
        tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(supervisor.in_flight(), 0);
    }
}
