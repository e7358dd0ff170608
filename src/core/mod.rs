//! Core queueing engine: job model, queue service, worker pool, idle
//! reclaimer, and the job-level error taxonomy.

pub mod error;
pub mod job;
pub mod queue;
pub mod reclaimer;
pub mod runner;

pub use error::{AppResult, JobError, JobNotFound};
pub use job::{Job, JobSnapshot, JobStatus};
pub use queue::{QueueClosed, QueueOptions, QueueService, SubmitReceipt};
pub use runner::{GenerationPipeline, JobRunner, MAX_IMAGE_COUNT};
