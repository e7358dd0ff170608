//! Idle VRAM reclamation.
//!
//! A single-shot, rearmable countdown. When the service has seen no
//! submissions or completions for the configured quiet period, the backend
//! is asked to unload its models and free GPU memory. Release is advisory
//! cleanup: a failed release is logged and never retried, and it has no
//! effect on subsequent job processing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::GenerationBackend;
use crate::core::queue::QueueState;

/// Rearmable deadline owned by the queue service.
///
/// Each [`rearm`](Self::rearm) bumps a generation counter and spawns a fresh
/// sleeper; a sleeper that wakes to find its generation stale was superseded
/// and simply exits. This is the atomic replace-the-pending-timer discipline
/// that keeps two overlapping timers from both being live.
pub(crate) struct IdleReclaimer {
    delay: Duration,
    generation: AtomicU64,
    state: Arc<QueueState>,
    backend: Arc<dyn GenerationBackend>,
}

impl IdleReclaimer {
    pub(crate) fn new(
        delay: Duration,
        state: Arc<QueueState>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Self {
        Self {
            delay,
            generation: AtomicU64::new(0),
            state,
            backend,
        }
    }

    /// Restart the countdown, cancelling any pending one.
    ///
    /// Called on every submission and every terminal transition - every
    /// event that could plausibly mean "still busy".
    pub(crate) fn rearm(self: &Arc<Self>) {
        let armed = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let delay = self.delay;
        let reclaimer = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(reclaimer) = Weak::upgrade(&reclaimer) {
                reclaimer.fire(armed).await;
            }
        });
    }

    /// Timer expiry. Re-checks both the generation (a later rearm wins) and
    /// the busy state (a submission may have landed while the timer fired).
    async fn fire(self: Arc<Self>, armed: u64) {
        if self.generation.load(Ordering::Acquire) != armed {
            debug!(generation = armed, "idle timer superseded");
            return;
        }
        if !self.state.is_idle() {
            debug!("skipping VRAM release: jobs are active or queued");
            self.rearm();
            return;
        }
        info!(idle_secs = self.delay.as_secs(), "inactivity detected, releasing backend VRAM");
        if let Err(e) = self.backend.release_resources().await {
            warn!(error = %e, "VRAM release failed");
        }
    }
}
