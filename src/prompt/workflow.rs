//! Workflow templates and the parameter merge.
//!
//! Templates are ComfyUI API-format JSON documents keyed by well-known node
//! names (`Checkpoint`, `KSampler`, `EmptyLatentImage`, ...). The merge
//! writes request parameters into node inputs with a fixed priority:
//! user flag, then model configuration, then global defaults.

use std::path::PathBuf;

use rand::Rng;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::{GlobalDefaults, ModelConfig};
use crate::prompt::ParsedPrompt;

/// Fallbacks of last resort when neither the model configuration nor the
/// global defaults say otherwise.
const FALLBACK_STEPS: u32 = 20;
const FALLBACK_SIZE: u32 = 1024;
const FALLBACK_COUNT: u32 = 1;

/// Mandatory prefix for every negative prompt.
const NEGATIVE_PREFIX: &[&str] = &["nsfw", "nude"];

/// Problems loading a workflow template.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The template file could not be read.
    #[error("could not read workflow {name:?}: {source}")]
    Io {
        /// Template name.
        name: String,
        /// Underlying filesystem error.
        source: std::io::Error,
    },
    /// The template was not valid JSON.
    #[error("workflow {name:?} is not valid JSON: {source}")]
    Parse {
        /// Template name.
        name: String,
        /// Underlying parse error.
        source: serde_json::Error,
    },
}

/// Loads workflow templates from a directory by name.
#[derive(Debug, Clone)]
pub struct WorkflowLibrary {
    dir: PathBuf,
}

impl WorkflowLibrary {
    /// Create a library rooted at `dir`. Templates live at `dir/<name>.json`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load and parse the template named `name`.
    pub async fn load(&self, name: &str) -> Result<Value, WorkflowError> {
        let path = self.dir.join(format!("{name}.json"));
        debug!(path = %path.display(), "loading workflow template");
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| WorkflowError::Io {
                name: name.to_string(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|source| WorkflowError::Parse {
            name: name.to_string(),
            source,
        })
    }
}

/// Write request parameters into a workflow template in place.
///
/// Only nodes present in the template are touched, so one merge serves
/// checkpoint-based and UNet-based workflows alike. Sizing parameters use
/// user > model > global priority; a seed of `-1` (or none) is replaced
/// with a fresh random seed.
pub fn apply_model_config(
    workflow: &mut Value,
    model: &ModelConfig,
    parsed: &ParsedPrompt,
    defaults: &GlobalDefaults,
) {
    if let Some(name) = &model.checkpoint_name {
        set_input(workflow, "Checkpoint", "ckpt_name", name.as_str().into());
    }
    if let Some(name) = &model.unet_name {
        set_input(workflow, "UNETLoader", "unet_name", name.as_str().into());
    }
    if let Some(name) = &model.clip_name {
        set_input(workflow, "CLIPLoader", "clip_name", name.as_str().into());
    }
    if let Some(name) = &model.vae {
        set_input(workflow, "VAELoader", "vae_name", name.as_str().into());
    }

    if let Some(inputs) = node_inputs(workflow, "KSampler") {
        let steps = model.steps.or(defaults.steps).unwrap_or(FALLBACK_STEPS);
        inputs.insert("steps".to_string(), steps.into());
        if let Some(cfg) = model.cfg {
            inputs.insert("cfg".to_string(), cfg.into());
        }
        if let Some(sampler) = &model.sampler_name {
            inputs.insert("sampler_name".to_string(), sampler.as_str().into());
        }
        let seed = match parsed.seed {
            Some(seed) if seed != -1 => seed,
            _ => random_seed(),
        };
        inputs.insert("seed".to_string(), seed.into());
    }

    // Older workflows use EmptyLatentImage; SD3-family ones its sibling.
    for node in ["EmptyLatentImage", "EmptySD3LatentImage"] {
        if let Some(inputs) = node_inputs(workflow, node) {
            let width = parsed
                .width
                .or(model.image_width)
                .or(defaults.width)
                .unwrap_or(FALLBACK_SIZE);
            let height = parsed
                .height
                .or(model.image_height)
                .or(defaults.height)
                .unwrap_or(FALLBACK_SIZE);
            let batch = parsed
                .count
                .or(model.count)
                .or(defaults.count)
                .unwrap_or(FALLBACK_COUNT);
            inputs.insert("width".to_string(), width.into());
            inputs.insert("height".to_string(), height.into());
            inputs.insert("batch_size".to_string(), batch.into());
            break;
        }
    }

    let default_positive = model.default_positive_prompt.clone().unwrap_or_default();
    if node_inputs(workflow, "PromptConcatenate").is_some() {
        set_input(
            workflow,
            "PromptConcatenate",
            "string_a",
            default_positive.into(),
        );
        set_input(
            workflow,
            "PromptConcatenate",
            "string_b",
            parsed.prompt.as_str().into(),
        );
    } else if node_inputs(workflow, "PositivePrompt").is_some() {
        let text = join_segments(&[&default_positive, &parsed.prompt]);
        set_input(workflow, "PositivePrompt", "text", text.into());
    }

    if node_inputs(workflow, "NegativePrompt").is_some() {
        let default_negative = model.default_negative_prompt.clone().unwrap_or_default();
        let user_negative = parsed.negative_prompt.clone().unwrap_or_default();
        let mut segments: Vec<&str> = NEGATIVE_PREFIX.to_vec();
        segments.push(&default_negative);
        segments.push(&user_negative);
        let text = join_segments(&segments);
        set_input(workflow, "NegativePrompt", "text", text.into());
    }

    debug!("workflow template merged with request parameters");
}

/// Random sampler seed in the same range callers can pass explicitly.
fn random_seed() -> i64 {
    rand::rng().random_range(1..=1_000_000)
}

/// Join non-empty segments with a comma separator.
fn join_segments(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Mutable `inputs` object of a node, if the node exists in the template.
fn node_inputs<'a>(
    workflow: &'a mut Value,
    node: &str,
) -> Option<&'a mut serde_json::Map<String, Value>> {
    workflow
        .get_mut(node)?
        .get_mut("inputs")?
        .as_object_mut()
}

fn set_input(workflow: &mut Value, node: &str, key: &str, value: Value) {
    if let Some(inputs) = node_inputs(workflow, node) {
        inputs.insert(key.to_string(), value);
    }
}
