//! Error types for job execution and the status/wait boundary.

use thiserror::Error;

use crate::backend::BackendError;
use crate::output::OutputError;

/// A failure that terminates a single job.
///
/// Every variant is caught at the worker boundary and recorded on the job as
/// its terminal error description; none of them ever propagate far enough to
/// take a worker down. The `Display` text is what callers see in the job's
/// `error` field, so messages stay human-readable.
#[derive(Debug, Error)]
pub enum JobError {
    /// Override syntax that parsed but carries an unusable value (e.g. an
    /// image count outside the allowed range). Unparseable numerics do not
    /// reach this variant: they fall through to defaults instead.
    #[error("prompt error: {0}")]
    Prompt(String),

    /// Unknown model or a missing/invalid workflow template.
    #[error("configuration error: {0}")]
    Config(String),

    /// The backend rejected the request, refused the connection, or violated
    /// the streaming protocol.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The backend completed without producing any image artifacts.
    #[error("no images were generated")]
    NoOutput,

    /// Decoding or persisting a returned artifact failed.
    #[error("output error: {0}")]
    Output(#[from] OutputError),
}

/// Lookup failure at the status/wait boundary: the caller asked about a job
/// id that was never issued (or belongs to a previous process lifetime).
#[derive(Debug, Error)]
#[error("job not found: {0}")]
pub struct JobNotFound(pub String);

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
