//! The job queue and worker pool.
//!
//! A [`QueueService`] owns every piece of shared mutable state in the
//! system: the job lookup table, the ordered queue, and the active-worker
//! set. It is constructed once at process start and handed around as an
//! `Arc` - there are no ambient globals.
//!
//! # Design
//!
//! - **Strict FIFO**: submissions go into an unbounded mpsc channel; the
//!   channel's send order is the dequeue order, so jobs begin processing in
//!   exactly arrival order regardless of the worker count.
//! - **Single consumer per item**: the receiver sits behind an async mutex
//!   shared by all workers, so each job is dequeued exactly once.
//! - **Failure isolation**: the entire per-job pipeline runs behind a
//!   [`JobRunner`] seam; any error becomes the job's terminal `failed`
//!   state and the worker loop continues to the next job.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::backend::GenerationBackend;
use crate::config::ModelRegistry;
use crate::core::job::{Job, JobSnapshot};
use crate::core::reclaimer::IdleReclaimer;
use crate::core::runner::JobRunner;
use crate::core::JobNotFound;

/// Tunables for the queue engine.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Number of concurrent workers. 1 (the default) means true
    /// single-flight FIFO with zero overlap.
    pub worker_count: usize,
    /// Quiet period after which backend VRAM is released.
    pub idle_delay: std::time::Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            worker_count: 1,
            idle_delay: std::time::Duration::from_secs(10 * 60),
        }
    }
}

/// Returned by [`QueueService::submit`].
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    /// Opaque id for later status/wait lookups.
    pub job_id: String,
    /// Queue depth plus active jobs at the instant of enqueue. Best-effort:
    /// concurrent submissions may observe the same count, so this is an
    /// approximation of dispatch position, not a guarantee.
    pub queue_position: usize,
}

/// Submission was rejected because the worker pool has shut down.
#[derive(Debug, Error)]
#[error("queue is shut down")]
pub struct QueueClosed;

/// Shared bookkeeping for jobs in flight.
///
/// A job lives in exactly one of {channel, active set, terminal} with
/// respect to this bookkeeping; the `jobs` table retains every record
/// permanently for status/wait lookups.
#[derive(Debug, Default)]
pub(crate) struct QueueState {
    jobs: RwLock<HashMap<String, Arc<Job>>>,
    queued: AtomicUsize,
    active: Mutex<HashSet<String>>,
}

impl QueueState {
    /// True when no job is queued or being processed.
    pub(crate) fn is_idle(&self) -> bool {
        self.queued.load(Ordering::Acquire) == 0 && self.active.lock().is_empty()
    }

    fn pending(&self) -> usize {
        self.queued.load(Ordering::Acquire) + self.active.lock().len()
    }
}

/// The queue service: submission, status, blocking wait, and model listing.
pub struct QueueService {
    state: Arc<QueueState>,
    tx: mpsc::UnboundedSender<Arc<Job>>,
    registry: Arc<ModelRegistry>,
    reclaimer: Arc<IdleReclaimer>,
}

impl QueueService {
    /// Start the service: spawns `worker_count` workers and arms the idle
    /// reclamation timer.
    ///
    /// `runner` executes one job end to end; `backend` is only used here for
    /// the advisory VRAM release when the quiet period elapses.
    pub fn start(
        options: QueueOptions,
        registry: Arc<ModelRegistry>,
        runner: Arc<dyn JobRunner>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Arc<Self> {
        let worker_count = options.worker_count.max(1);
        let state = Arc::new(QueueState::default());
        let reclaimer = Arc::new(IdleReclaimer::new(
            options.idle_delay,
            Arc::clone(&state),
            backend,
        ));

        let (tx, rx) = mpsc::unbounded_channel::<Arc<Job>>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        for worker_id in 0..worker_count {
            tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&state),
                Arc::clone(&runner),
                Arc::clone(&reclaimer),
                Arc::clone(&rx),
            ));
        }

        info!(worker_count, idle_delay_secs = options.idle_delay.as_secs(), "queue service started");
        reclaimer.rearm();

        Arc::new(Self {
            state,
            tx,
            registry,
            reclaimer,
        })
    }

    /// Enqueue a new job in arrival order.
    ///
    /// Returns immediately with the job id and a best-effort queue position
    /// (queued + active counted after the enqueue). Also rearms the idle
    /// timer, since a submission means the system is busy again.
    pub fn submit(
        &self,
        raw_message: impl Into<String>,
        submitter: impl Into<String>,
    ) -> Result<SubmitReceipt, QueueClosed> {
        self.reclaimer.rearm();

        let job = Job::new(raw_message, submitter);
        let job_id = job.id().to_string();
        self.state.jobs.write().insert(job_id.clone(), Arc::clone(&job));

        self.state.queued.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(job).is_err() {
            self.state.queued.fetch_sub(1, Ordering::AcqRel);
            self.state.jobs.write().remove(&job_id);
            return Err(QueueClosed);
        }

        let queue_position = self.state.pending();
        info!(job_id = %job_id, queue_position, "job submitted");
        Ok(SubmitReceipt {
            job_id,
            queue_position,
        })
    }

    /// Non-blocking snapshot of a job's state.
    pub fn status(&self, job_id: &str) -> Result<JobSnapshot, JobNotFound> {
        self.lookup(job_id).map(|job| job.snapshot())
    }

    /// Suspend until the job reaches a terminal state, then return its
    /// snapshot. Returns immediately for already-terminal jobs.
    pub async fn wait(&self, job_id: &str) -> Result<JobSnapshot, JobNotFound> {
        let job = self.lookup(job_id)?;
        Ok(job.wait().await)
    }

    /// Registered model names, excluding the reserved defaults entry.
    pub fn models(&self) -> Vec<String> {
        self.registry.model_names()
    }

    fn lookup(&self, job_id: &str) -> Result<Arc<Job>, JobNotFound> {
        self.state
            .jobs
            .read()
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobNotFound(job_id.to_string()))
    }
}

/// One worker: block until a job is available, own it through the pipeline,
/// publish the terminal outcome, and rearm the idle timer. The loop exits
/// only when the submission channel closes.
async fn worker_loop(
    worker_id: usize,
    state: Arc<QueueState>,
    runner: Arc<dyn JobRunner>,
    reclaimer: Arc<IdleReclaimer>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Arc<Job>>>>,
) {
    info!(worker_id, "worker started");
    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            info!(worker_id, "queue closed, worker exiting");
            break;
        };

        state.queued.fetch_sub(1, Ordering::AcqRel);
        job.begin_processing();
        state.active.lock().insert(job.id().to_string());
        info!(worker_id, job_id = %job.id(), submitter = %job.submitter(), "processing job");

        let outcome = runner.run(job.raw_message()).await;

        // Unconditional bookkeeping: active-set removal, terminal write,
        // waiter wakeup, and timer rearm happen for success and failure
        // alike. One job's failure never blocks the next.
        state.active.lock().remove(job.id());
        match outcome {
            Ok(result) => {
                info!(worker_id, job_id = %job.id(), result = %result, "job completed");
                job.complete(result);
            }
            Err(e) => {
                error!(worker_id, job_id = %job.id(), error = %e, "job failed");
                job.fail(e.to_string());
            }
        }
        reclaimer.rearm();
    }
}
