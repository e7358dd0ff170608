//! Integration tests for idle VRAM reclamation.
//!
//! Run with paused time: `tokio::time::advance` plays the quiet period
//! forward deterministically, and yield loops give the timer tasks a chance
//! to observe it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use fategen::backend::{Artifact, BackendError, GenerationBackend, PendingRequest};
use fategen::config::ModelRegistry;
use fategen::core::{JobError, JobRunner, JobStatus, QueueOptions, QueueService};

const IDLE_DELAY: Duration = Duration::from_secs(60);

struct CountingBackend {
    releases: AtomicUsize,
}

impl CountingBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            releases: AtomicUsize::new(0),
        })
    }

    fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for CountingBackend {
    async fn submit_request(
        &self,
        _workflow: &serde_json::Value,
    ) -> Result<PendingRequest, BackendError> {
        Ok(PendingRequest::detached("null"))
    }

    async fn stream_results(
        &self,
        _pending: PendingRequest,
    ) -> Result<Vec<Artifact>, BackendError> {
        Ok(Vec::new())
    }

    async fn release_resources(&self) -> Result<(), BackendError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Completes instantly unless a gate is installed.
struct GateRunner {
    gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl JobRunner for GateRunner {
    async fn run(&self, raw_message: &str) -> Result<String, JobError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        Ok(format!("/out/{raw_message}.webp"))
    }
}

fn registry() -> Arc<ModelRegistry> {
    let raw = r#"{"sdxl": {"workflow": "sdxl_base"}}"#;
    Arc::new(ModelRegistry::from_json_str(raw).expect("registry"))
}

fn start(
    runner: GateRunner,
    backend: Arc<CountingBackend>,
) -> Arc<QueueService> {
    QueueService::start(
        QueueOptions {
            worker_count: 1,
            idle_delay: IDLE_DELAY,
        },
        registry(),
        Arc::new(runner),
        backend,
    )
}

/// Let timer tasks scheduled before `advance` run.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn quiet_period_releases_vram_once() {
    let backend = CountingBackend::new();
    let _service = start(GateRunner { gate: None }, Arc::clone(&backend));
    settle().await;

    tokio::time::advance(IDLE_DELAY + Duration::from_secs(1)).await;
    settle().await;

    assert_eq!(backend.releases(), 1);
    // No further releases without new activity.
    tokio::time::advance(IDLE_DELAY * 3).await;
    settle().await;
    assert_eq!(backend.releases(), 1);
}

#[tokio::test(start_paused = true)]
async fn release_does_not_fire_before_the_delay() {
    let backend = CountingBackend::new();
    let _service = start(GateRunner { gate: None }, Arc::clone(&backend));
    settle().await;

    tokio::time::advance(IDLE_DELAY - Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(backend.releases(), 0);
}

#[tokio::test(start_paused = true)]
async fn submission_restarts_the_countdown() {
    let backend = CountingBackend::new();
    let service = start(GateRunner { gate: None }, Arc::clone(&backend));
    settle().await;

    // Halfway through the quiet period a job arrives and completes.
    tokio::time::advance(IDLE_DELAY / 2).await;
    settle().await;
    let id = service.submit("fox", "alice").expect("submit").job_id;
    loop {
        if service.status(&id).expect("known job").status == JobStatus::Completed {
            break;
        }
        tokio::task::yield_now().await;
    }

    // The original deadline passes without a release.
    tokio::time::advance(IDLE_DELAY / 2 + Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(backend.releases(), 0);

    // A full quiet period after the completion, it fires.
    tokio::time::advance(IDLE_DELAY).await;
    settle().await;
    assert_eq!(backend.releases(), 1);
}

#[tokio::test(start_paused = true)]
async fn busy_service_skips_release_and_tries_again() {
    let gate = Arc::new(Semaphore::new(0));
    let backend = CountingBackend::new();
    let service = start(
        GateRunner {
            gate: Some(Arc::clone(&gate)),
        },
        Arc::clone(&backend),
    );
    settle().await;

    let id = service.submit("slow", "alice").expect("submit").job_id;
    loop {
        if service.status(&id).expect("known job").status == JobStatus::Processing {
            break;
        }
        tokio::task::yield_now().await;
    }

    // Deadlines elapse while the job is still running: no release.
    tokio::time::advance(IDLE_DELAY * 2).await;
    settle().await;
    assert_eq!(backend.releases(), 0);

    // Finish the job; a fresh quiet period later the release happens.
    gate.add_permits(1);
    loop {
        if service.status(&id).expect("known job").status == JobStatus::Completed {
            break;
        }
        tokio::task::yield_now().await;
    }
    tokio::time::advance(IDLE_DELAY + Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(backend.releases(), 1);
}
