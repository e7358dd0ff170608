//! Persisting generated images and mapping them to result references.

pub mod grid;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info};

use crate::backend::Artifact;

/// Problems persisting or post-processing generated images.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Filesystem trouble in the output directory.
    #[error("output io error: {0}")]
    Io(#[from] std::io::Error),
    /// An artifact could not be decoded or re-encoded.
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
    /// An image-processing task was cancelled or panicked.
    #[error("image task failed: {0}")]
    Internal(String),
}

/// Writes request artifacts into the output directory as WebP files.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    /// Create a store rooted at `dir`. The directory is created on first
    /// save if it does not exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist every artifact of one request, returning the saved paths in
    /// artifact order. Files are named `<unix-ts>_<request-id>_<index>.webp`.
    pub async fn save_artifacts(
        &self,
        artifacts: &[Artifact],
        request_id: &str,
    ) -> Result<Vec<PathBuf>, OutputError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut paths = Vec::with_capacity(artifacts.len());
        for (index, artifact) in artifacts.iter().enumerate() {
            let path = self.dir.join(image_filename(timestamp, request_id, index));
            let bytes = artifact.clone();
            let target = path.clone();
            // Decode and re-encode off the async runtime.
            tokio::task::spawn_blocking(move || -> Result<(), OutputError> {
                let decoded = image::load_from_memory(&bytes)?;
                decoded.save_with_format(&target, image::ImageFormat::WebP)?;
                Ok(())
            })
            .await
            .map_err(|e| OutputError::Internal(e.to_string()))??;
            debug!(path = %path.display(), "saved artifact");
            paths.push(path);
        }
        info!(request_id = %request_id, count = paths.len(), "artifacts persisted");
        Ok(paths)
    }
}

/// Standard filename for one generated image.
fn image_filename(timestamp: u64, request_id: &str, index: usize) -> String {
    format!("{timestamp}_{request_id}_{index}.webp")
}

/// Map a saved file path to the reference reported to the caller.
///
/// With an empty `base` the local path is reported as-is; otherwise the
/// file name is appended to the base URL.
pub fn public_url(path: &str, base: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    if base.is_empty() {
        return path.to_string();
    }
    let filename = Path::new(path)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    format!("{}/{}", base.trim_end_matches('/'), filename)
}
