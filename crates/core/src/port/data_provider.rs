// Data Provider Port (external quote/fundamentals/filings/news/AI clients)

use super::derived_store::DerivedRecord;
use crate::domain::Component;
use async_trait::async_trait;
use thiserror::Error;

/// What a handler asks the provider for
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub component: Component,
    /// Ticker or group key
    pub subject_key: String,
    /// Previously derived value still considered valid (Slow tier only).
    /// None forces a full re-derivation.
    pub existing: Option<DerivedRecord>,
}

/// Provider errors, classified at the collaborator boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Timeouts, rate limits, temporary upstream 5xx
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Invalid subject, malformed or irrecoverable upstream response
    #[error("Permanent provider error: {0}")]
    Permanent(String),
}

/// Opaque fetch/derive function for one component
///
/// Group fetches may return records for many subjects.
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<Vec<DerivedRecord>, ProviderError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock provider behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Fail transiently for the first N calls, then succeed
        TransientThenSuccess(usize),
        /// Always fail transiently
        Transient(String),
        /// Always fail permanently
        Permanent(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
        /// Never return
        Hang,
    }

    /// A request the mock observed
    #[derive(Debug, Clone, PartialEq)]
    pub struct ObservedRequest {
        pub component: Component,
        pub subject_key: String,
        pub had_existing: bool,
    }

    /// Mock DataProvider for testing
    pub struct MockDataProvider {
        behavior: Mutex<MockBehavior>,
        delay: Duration,
        call_count: AtomicUsize,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        overlaps: AtomicUsize,
        active: Mutex<HashSet<(Component, String)>>,
        requests: Mutex<Vec<ObservedRequest>>,
    }

    impl MockDataProvider {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                delay: Duration::ZERO,
                call_count: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
                overlaps: AtomicUsize::new(0),
                active: Mutex::new(HashSet::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        /// Each call sleeps this long before answering
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Highest number of simultaneous fetches seen
        pub fn peak_in_flight(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }

        /// Times a fetch started while another for the same (component, subject) was running
        pub fn overlaps(&self) -> usize {
            self.overlaps.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<ObservedRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    struct InFlight<'a> {
        provider: &'a MockDataProvider,
        key: (Component, String),
    }

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.provider.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.provider.active.lock().unwrap().remove(&self.key);
        }
    }

    #[async_trait]
    impl DataProvider for MockDataProvider {
        async fn fetch(&self, request: FetchRequest) -> Result<Vec<DerivedRecord>, ProviderError> {
            let call = self.call_count.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(ObservedRequest {
                component: request.component,
                subject_key: request.subject_key.clone(),
                had_existing: request.existing.is_some(),
            });

            let key = (request.component, request.subject_key.clone());
            if !self.active.lock().unwrap().insert(key.clone()) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight {
                provider: self,
                key,
            };

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let behavior = self.behavior.lock().unwrap().clone();
            match behavior {
                MockBehavior::Success => {}
                MockBehavior::TransientThenSuccess(n) if call < n => {
                    return Err(ProviderError::Transient(format!("mock transient #{}", call + 1)));
                }
                MockBehavior::TransientThenSuccess(_) => {}
                MockBehavior::Transient(msg) => return Err(ProviderError::Transient(msg)),
                MockBehavior::Permanent(msg) => return Err(ProviderError::Permanent(msg)),
                MockBehavior::Panic(msg) => panic!("{}", msg),
                MockBehavior::Hang => std::future::pending::<()>().await,
            }

            Ok(vec![DerivedRecord::new(
                request.subject_key.clone(),
                request.component,
                serde_json::json!({
                    "subject": request.subject_key,
                    "component": request.component.as_str(),
                    "call": call + 1,
                }),
            )])
        }
    }
}
