// Shutdown signalling between the process, the Executor and the ShutdownManager
//
// One direction each: the manager sends "drain" over the shutdown channel, the
// Executor answers "drained" over a separate oneshot.

use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

/// Shutdown signal for graceful termination
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal (returns immediately if already signalled)
    pub async fn wait(&mut self) {
        // Err means the sender is gone; treat it as shutdown too
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token holder
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// Another token for this channel
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

/// Held by the Executor; consumed once every in-flight job is resolved
pub struct DrainReporter {
    tx: oneshot::Sender<()>,
}

impl DrainReporter {
    pub fn report(self) {
        let _ = self.tx.send(());
    }
}

/// Held by the ShutdownManager
pub struct DrainWaiter {
    rx: oneshot::Receiver<()>,
}

/// Create the drained-notification channel
pub fn drain_channel() -> (DrainReporter, DrainWaiter) {
    let (tx, rx) = oneshot::channel();
    (DrainReporter { tx }, DrainWaiter { rx })
}

/// Orchestrates graceful termination of the dispatch side
pub struct ShutdownManager {
    sender: ShutdownSender,
    drained: DrainWaiter,
    timeout: Duration,
}

impl ShutdownManager {
    /// `timeout` bounds the whole drain so the process always exits promptly
    pub fn new(sender: ShutdownSender, drained: DrainWaiter, timeout: Duration) -> Self {
        Self {
            sender,
            drained,
            timeout,
        }
    }

    /// Signal drain and wait for the Executor's report.
    ///
    /// Returns true if the Executor reported drained within the timeout.
    pub async fn shutdown(self) -> bool {
        info!(timeout_ms = self.timeout.as_millis() as u64, "Draining executor");
        self.sender.shutdown();

        match tokio::time::timeout(self.timeout, self.drained.rx).await {
            Ok(Ok(())) => {
                info!("Executor drained");
                true
            }
            Ok(Err(_)) => {
                warn!("Executor exited without reporting drained");
                false
            }
            Err(_) => {
                warn!("Drain timed out; RUNNING jobs will be recovered on next start");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_cloned_after_signal_still_sees_it() {
        let (tx, token) = shutdown_channel();
        tx.shutdown();
        let mut late = token.clone();
        assert!(late.is_shutdown());
        tokio::time::timeout(Duration::from_millis(100), late.wait())
            .await
            .expect("wait must return once signalled");
    }

    #[tokio::test]
    async fn test_manager_waits_for_drained_report() {
        let (tx, mut token) = shutdown_channel();
        let (reporter, waiter) = drain_channel();
        let manager = ShutdownManager::new(tx, waiter, Duration::from_secs(1));

        let executor = tokio::spawn(async move {
            token.wait().await;
            reporter.report();
        });

        assert!(manager.shutdown().await);
        executor.await.unwrap();
    }

    #[tokio::test]
    async fn test_manager_gives_up_after_timeout() {
        let (tx, _token) = shutdown_channel();
        let (_reporter, waiter) = drain_channel();
        let manager = ShutdownManager::new(tx, waiter, Duration::from_millis(20));
        assert!(!manager.shutdown().await);
    }
}
