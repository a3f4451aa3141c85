// Job Domain Model

use super::freshness::{Component, JobClass};
use serde::{Deserialize, Serialize};

/// Job ID (UUID v4 in production)
pub type JobId = String;

/// Subject Key (ticker symbol or group key such as `exchange:US`)
pub type SubjectKey = String;

/// Job State
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Complete,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Complete => "COMPLETE",
            JobState::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobState::Pending),
            "RUNNING" => Some(JobState::Running),
            "COMPLETE" => Some(JobState::Complete),
            "FAILED" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job Kind - closed set, one per refreshable component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    RefreshQuotes,
    RefreshFundamentals,
    RefreshFilingIndex,
    RefreshFilingDocuments,
    RefreshNews,
    RecomputeSignals,
}

impl JobKind {
    pub const ALL: [JobKind; 6] = [
        JobKind::RefreshQuotes,
        JobKind::RefreshFundamentals,
        JobKind::RefreshFilingIndex,
        JobKind::RefreshFilingDocuments,
        JobKind::RefreshNews,
        JobKind::RecomputeSignals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::RefreshQuotes => "refresh-quotes",
            JobKind::RefreshFundamentals => "refresh-fundamentals",
            JobKind::RefreshFilingIndex => "refresh-filing-index",
            JobKind::RefreshFilingDocuments => "refresh-filing-documents",
            JobKind::RefreshNews => "refresh-news",
            JobKind::RecomputeSignals => "recompute-signals",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// The component this kind refreshes
    pub fn component(&self) -> Component {
        match self {
            JobKind::RefreshQuotes => Component::Quotes,
            JobKind::RefreshFundamentals => Component::Fundamentals,
            JobKind::RefreshFilingIndex => Component::FilingsIndex,
            JobKind::RefreshFilingDocuments => Component::FilingsDocuments,
            JobKind::RefreshNews => Component::News,
            JobKind::RecomputeSignals => Component::Signals,
        }
    }

    pub fn for_component(component: Component) -> Self {
        match component {
            Component::Quotes => JobKind::RefreshQuotes,
            Component::Fundamentals => JobKind::RefreshFundamentals,
            Component::FilingsIndex => JobKind::RefreshFilingIndex,
            Component::FilingsDocuments => JobKind::RefreshFilingDocuments,
            Component::News => JobKind::RefreshNews,
            Component::Signals => JobKind::RecomputeSignals,
        }
    }

    /// Static light/heavy classification from policy metadata
    pub fn class(&self) -> JobClass {
        self.component().class()
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub subject_key: SubjectKey,
    pub class: JobClass,
    pub state: JobState,

    /// Discard existing derived data before re-deriving
    pub force: bool,

    pub attempts: i32,
    pub max_attempts: i32,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    /// Retry backoff gate (epoch ms)
    pub not_before: Option<i64>,

    pub last_error: Option<String>,
}

impl Job {
    /// Create a new pending job
    ///
    /// ID and timestamp are injected, never generated here.
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        kind: JobKind,
        subject_key: impl Into<String>,
        max_attempts: i32,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            subject_key: subject_key.into(),
            class: kind.class(),
            state: JobState::Pending,
            force: false,
            attempts: 0,
            max_attempts,
            created_at,
            started_at: None,
            completed_at: None,
            not_before: None,
            last_error: None,
        }
    }

    /// Create a test job with deterministic ID and timestamp.
    ///
    /// **Note**: tests only. Production code injects ID and time via providers.
    pub fn new_test(kind: JobKind, subject_key: impl Into<String>) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self::new(
            format!("test-{}", counter),
            (counter * 1000) as i64,
            kind,
            subject_key,
            3,
        )
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Transition to Running with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> crate::domain::error::Result<()> {
        self.expect_state(JobState::Pending, JobState::Running)?;
        self.state = JobState::Running;
        self.started_at = Some(now_millis);
        self.not_before = None;
        Ok(())
    }

    /// Transition to Complete with explicit timestamp
    pub fn complete(&mut self, now_millis: i64) -> crate::domain::error::Result<()> {
        self.expect_state(JobState::Running, JobState::Complete)?;
        self.state = JobState::Complete;
        self.completed_at = Some(now_millis);
        self.last_error = None;
        Ok(())
    }

    /// Transition to Failed, recording the error
    pub fn fail(&mut self, now_millis: i64, error: impl Into<String>) -> crate::domain::error::Result<()> {
        self.expect_state(JobState::Running, JobState::Failed)?;
        self.state = JobState::Failed;
        self.completed_at = Some(now_millis);
        self.last_error = Some(error.into());
        Ok(())
    }

    /// Return a running job to Pending so it is dispatched again
    pub fn requeue(&mut self, not_before: Option<i64>, error: Option<String>) -> crate::domain::error::Result<()> {
        self.expect_state(JobState::Running, JobState::Pending)?;
        self.state = JobState::Pending;
        self.started_at = None;
        self.not_before = not_before;
        if error.is_some() {
            self.last_error = error;
        }
        Ok(())
    }

    fn expect_state(&self, from: JobState, to: JobState) -> crate::domain::error::Result<()> {
        if self.state != from {
            return Err(crate::domain::error::DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending_with_static_class() {
        let job = Job::new_test(JobKind::RefreshFilingDocuments, "AAPL");
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.class, JobClass::Heavy);
        assert_eq!(job.attempts, 0);
        assert!(!job.force);
    }

    #[test]
    fn test_lifecycle_pending_running_complete() {
        let mut job = Job::new_test(JobKind::RefreshFundamentals, "AAPL");
        job.start(10).unwrap();
        assert_eq!(job.started_at, Some(10));
        job.complete(20).unwrap();
        assert_eq!(job.state, JobState::Complete);
        assert_eq!(job.completed_at, Some(20));
    }

    #[test]
    fn test_complete_requires_running() {
        let mut job = Job::new_test(JobKind::RefreshNews, "MSFT");
        let err = job.complete(5).unwrap_err();
        assert!(err.to_string().contains("PENDING -> COMPLETE"));
    }

    #[test]
    fn test_requeue_clears_start_and_keeps_previous_error() {
        let mut job = Job::new_test(JobKind::RefreshNews, "MSFT");
        job.start(10).unwrap();
        job.requeue(Some(500), Some("timeout".into())).unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.started_at, None);
        assert_eq!(job.not_before, Some(500));

        job.start(600).unwrap();
        job.requeue(None, None).unwrap();
        assert_eq!(job.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_fail_records_error() {
        let mut job = Job::new_test(JobKind::RecomputeSignals, "TSLA");
        job.start(1).unwrap();
        job.fail(2, "invalid subject").unwrap();
        assert!(job.state.is_terminal());
        assert_eq!(job.last_error.as_deref(), Some("invalid subject"));
    }

    #[test]
    fn test_kind_component_mapping_is_bijective() {
        for kind in JobKind::ALL {
            assert_eq!(JobKind::for_component(kind.component()), kind);
            assert_eq!(JobKind::parse(kind.as_str()), Some(kind));
        }
    }
}
