//! The per-job execution seam and its production implementation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::backend::GenerationBackend;
use crate::config::ModelRegistry;
use crate::core::JobError;
use crate::output::{grid, public_url, OutputStore};
use crate::prompt::{apply_model_config, parse_message, WorkflowLibrary};

/// Maximum images a single request may ask for. Larger batches would tie up
/// the backend for one caller and blow past its VRAM budget.
pub const MAX_IMAGE_COUNT: u32 = 16;

/// Executes one job end to end and produces its result reference.
///
/// This is the boundary the worker pool catches errors at: whatever an
/// implementation returns, the queue engine keeps running. Tests substitute
/// their own runners to exercise the queue without a live backend.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run the full pipeline for one raw request message, returning the
    /// result reference (a local path or public URL) on success.
    async fn run(&self, raw_message: &str) -> Result<String, JobError>;
}

/// Production pipeline: parse -> resolve model -> load workflow -> merge ->
/// submit -> stream artifacts -> persist -> composite -> map to URL.
pub struct GenerationPipeline {
    registry: Arc<ModelRegistry>,
    workflows: WorkflowLibrary,
    backend: Arc<dyn GenerationBackend>,
    output: OutputStore,
    web_domain: String,
}

impl GenerationPipeline {
    /// Assemble the pipeline from its collaborators. `web_domain` may be
    /// empty, in which case results are reported as local paths.
    pub fn new(
        registry: Arc<ModelRegistry>,
        workflows: WorkflowLibrary,
        backend: Arc<dyn GenerationBackend>,
        output: OutputStore,
        web_domain: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            workflows,
            backend,
            output,
            web_domain: web_domain.into(),
        }
    }
}

#[async_trait]
impl JobRunner for GenerationPipeline {
    async fn run(&self, raw_message: &str) -> Result<String, JobError> {
        let parsed = parse_message(raw_message);
        if let Some(count) = parsed.count {
            if count == 0 || count > MAX_IMAGE_COUNT {
                return Err(JobError::Prompt(format!(
                    "count must be between 1 and {MAX_IMAGE_COUNT}, got {count}"
                )));
            }
        }

        let (model_name, model) = self
            .registry
            .resolve(parsed.model.as_deref())
            .map_err(|e| JobError::Config(e.to_string()))?;
        info!(model = %model_name, workflow = %model.workflow, "starting generation");

        let mut workflow = self
            .workflows
            .load(&model.workflow)
            .await
            .map_err(|e| JobError::Config(e.to_string()))?;
        apply_model_config(&mut workflow, model, &parsed, self.registry.defaults());

        let pending = self.backend.submit_request(&workflow).await?;
        let request_id = pending.request_id.clone();
        let artifacts = self.backend.stream_results(pending).await?;
        debug!(request_id = %request_id, artifacts = artifacts.len(), "backend stream finished");
        if artifacts.is_empty() {
            return Err(JobError::NoOutput);
        }

        let saved = self.output.save_artifacts(&artifacts, &request_id).await?;
        let result = if saved.len() > 1 {
            grid::composite_grid(&saved).await?
        } else {
            saved.into_iter().next().ok_or(JobError::NoOutput)?
        };

        let path = result.to_string_lossy().into_owned();
        if self.web_domain.is_empty() {
            Ok(path)
        } else {
            Ok(public_url(&path, &self.web_domain))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Artifact, BackendError, PendingRequest};
    use crate::config::ModelRegistry;
    use crate::output::OutputStore;
    use crate::prompt::WorkflowLibrary;

    struct CannedBackend {
        artifacts: Vec<Artifact>,
    }

    #[async_trait]
    impl GenerationBackend for CannedBackend {
        async fn submit_request(
            &self,
            _workflow: &serde_json::Value,
        ) -> Result<PendingRequest, BackendError> {
            Ok(PendingRequest::detached("canned"))
        }

        async fn stream_results(
            &self,
            _pending: PendingRequest,
        ) -> Result<Vec<Artifact>, BackendError> {
            Ok(self.artifacts.clone())
        }

        async fn release_resources(&self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    fn pipeline(dir: &std::path::Path, artifacts: Vec<Artifact>) -> GenerationPipeline {
        let registry = Arc::new(
            ModelRegistry::from_json_str(r#"{"sdxl": {"workflow": "test"}}"#).unwrap(),
        );
        GenerationPipeline::new(
            registry,
            WorkflowLibrary::new(dir),
            Arc::new(CannedBackend { artifacts }),
            OutputStore::new(dir.join("out")),
            "",
        )
    }

    fn write_template(dir: &std::path::Path) {
        std::fs::write(
            dir.join("test.json"),
            r#"{"KSampler": {"inputs": {"seed": 0, "steps": 20}}}"#,
        )
        .unwrap();
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([0, 128, 255]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn zero_artifacts_is_a_no_output_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path());
        let err = pipeline(dir.path(), Vec::new())
            .run("a fox")
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::NoOutput));
    }

    #[tokio::test]
    async fn one_artifact_is_saved_without_compositing() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path());
        let result = pipeline(dir.path(), vec![png_bytes()])
            .run("a fox")
            .await
            .unwrap();
        assert!(result.ends_with("_canned_0.webp"), "{result}");
        assert!(!result.contains("_grid"));
    }

    #[tokio::test]
    async fn several_artifacts_become_one_grid() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path());
        let result = pipeline(dir.path(), vec![png_bytes(); 4])
            .run("a fox -c 4")
            .await
            .unwrap();
        assert!(result.ends_with("_grid.webp"), "{result}");
    }

    #[tokio::test]
    async fn out_of_range_count_is_a_prompt_error() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path());
        let pipeline = pipeline(dir.path(), vec![png_bytes()]);

        let err = pipeline.run("a fox --count 0").await.unwrap_err();
        assert!(matches!(err, JobError::Prompt(_)));
        let err = pipeline.run("a fox --count 17").await.unwrap_err();
        assert!(matches!(err, JobError::Prompt(_)));
    }

    #[tokio::test]
    async fn missing_template_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = pipeline(dir.path(), Vec::new())
            .run("a fox")
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Config(_)));
    }
}
