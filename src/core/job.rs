//! The job record: one user-submitted generation request and its lifecycle.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;

/// Lifecycle state of a job.
///
/// Transitions are monotonic and one-directional:
/// `Queued -> Processing -> {Completed | Failed}`. A job never re-enters
/// `Queued` after leaving it, and terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the arrival-order queue.
    Queued,
    /// Claimed by a worker and running the generation pipeline.
    Processing,
    /// Finished successfully; the result reference is set.
    Completed,
    /// Finished with an error; the error description is set.
    Failed,
}

impl JobStatus {
    /// Whether this status is terminal (`Completed` or `Failed`).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Read view of a job, shared by the polling and blocking interfaces.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Result reference (path or public URL); `None` until completed.
    pub result: Option<String>,
    /// Error description; `None` unless failed.
    pub error: Option<String>,
}

/// Mutable portion of a job, guarded by a short-critical-section mutex.
#[derive(Debug)]
struct JobState {
    status: JobStatus,
    result: Option<String>,
    error: Option<String>,
}

/// One user-submitted generation request and its lifecycle record.
///
/// Jobs are created at submission time and retained in the service's lookup
/// table for the process lifetime. Exactly one worker transitions a job out
/// of `Queued`; terminal fields are written once by that worker, after which
/// the job is effectively read-only.
#[derive(Debug)]
pub struct Job {
    id: String,
    raw_message: String,
    submitter: String,
    state: Mutex<JobState>,
    done: Notify,
}

impl Job {
    /// Create a new queued job with a fresh UUID.
    pub fn new(raw_message: impl Into<String>, submitter: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            raw_message: raw_message.into(),
            submitter: submitter.into(),
            state: Mutex::new(JobState {
                status: JobStatus::Queued,
                result: None,
                error: None,
            }),
            done: Notify::new(),
        })
    }

    /// Opaque unique job id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The raw text of the request, exactly as submitted.
    pub fn raw_message(&self) -> &str {
        &self.raw_message
    }

    /// Identifier of the submitter.
    pub fn submitter(&self) -> &str {
        &self.submitter
    }

    /// Current read view of the job.
    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.state.lock();
        JobSnapshot {
            status: state.status,
            result: state.result.clone(),
            error: state.error.clone(),
        }
    }

    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.lock().status.is_terminal()
    }

    /// Mark the job as claimed by a worker. Only valid from `Queued`; any
    /// other current state leaves the record untouched.
    pub(crate) fn begin_processing(&self) {
        let mut state = self.state.lock();
        if state.status == JobStatus::Queued {
            state.status = JobStatus::Processing;
        }
    }

    /// Record a successful terminal outcome and wake all waiters.
    /// Ignored if the job is already terminal.
    pub(crate) fn complete(&self, result: String) {
        {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return;
            }
            state.status = JobStatus::Completed;
            state.result = Some(result);
        }
        self.done.notify_waiters();
    }

    /// Record a failed terminal outcome and wake all waiters.
    /// Ignored if the job is already terminal.
    pub(crate) fn fail(&self, error: String) {
        {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return;
            }
            state.status = JobStatus::Failed;
            state.error = Some(error);
        }
        self.done.notify_waiters();
    }

    /// Suspend until the job is terminal, then return its snapshot.
    /// Returns immediately if the job is already terminal.
    pub async fn wait(&self) -> JobSnapshot {
        loop {
            // Register interest before checking state so a notification
            // between the check and the await cannot be lost.
            let notified = self.done.notified();
            let snapshot = self.snapshot();
            if snapshot.status.is_terminal() {
                return snapshot;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_queued_with_empty_outcome() {
        let job = Job::new("a castle", "alice");
        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Queued);
        assert!(snap.result.is_none());
        assert!(snap.error.is_none());
        assert!(!job.id().is_empty());
        assert_eq!(job.submitter(), "alice");
    }

    #[test]
    fn ids_are_unique() {
        let a = Job::new("x", "n");
        let b = Job::new("x", "n");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn complete_is_terminal_and_write_once() {
        let job = Job::new("x", "n");
        job.begin_processing();
        job.complete("out.webp".into());

        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.result.as_deref(), Some("out.webp"));

        // Terminal state never changes.
        job.fail("too late".into());
        job.complete("other.webp".into());
        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.result.as_deref(), Some("out.webp"));
        assert!(snap.error.is_none());
    }

    #[test]
    fn fail_records_error() {
        let job = Job::new("x", "n");
        job.begin_processing();
        job.fail("backend error: boom".into());
        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Failed);
        assert_eq!(snap.error.as_deref(), Some("backend error: boom"));
        assert!(snap.result.is_none());
    }

    #[test]
    fn begin_processing_only_from_queued() {
        let job = Job::new("x", "n");
        job.begin_processing();
        job.complete("r".into());
        job.begin_processing();
        assert_eq!(job.snapshot().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_terminal() {
        let job = Job::new("x", "n");
        job.begin_processing();
        job.fail("nope".into());
        let snap = job.wait().await;
        assert_eq!(snap.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn wait_wakes_on_completion() {
        let job = Job::new("x", "n");
        let waiter = {
            let job = Arc::clone(&job);
            tokio::spawn(async move { job.wait().await })
        };
        tokio::task::yield_now().await;
        job.begin_processing();
        job.complete("done.webp".into());
        let snap = waiter.await.expect("waiter task");
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.result.as_deref(), Some("done.webp"));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(serde_json::to_string(&JobStatus::Failed).unwrap(), "\"failed\"");
    }
}
