//! The model-configuration registry.
//!
//! A JSON document maps each model name to its workflow template reference,
//! component overrides, sampler defaults, image-size defaults, and default
//! prompt fragments. One reserved key, [`DEFAULTS_KEY`], holds process-wide
//! fallbacks. The registry is loaded once and read-only for the process
//! lifetime; models are kept in a `BTreeMap` so fallback selection is
//! deterministic (lexicographically first) rather than an accident of
//! insertion order.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Reserved registry key holding process-wide fallback defaults.
pub const DEFAULTS_KEY: &str = "DEFAULTS";

/// Per-model generation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Workflow template name (resolved to `<name>.json`).
    pub workflow: String,
    /// Checkpoint file to load, if the workflow has a `Checkpoint` node.
    pub checkpoint_name: Option<String>,
    /// UNet component override.
    pub unet_name: Option<String>,
    /// CLIP component override.
    pub clip_name: Option<String>,
    /// VAE component override.
    pub vae: Option<String>,
    /// Sampler step count.
    pub steps: Option<u32>,
    /// Classifier-free guidance scale.
    pub cfg: Option<f64>,
    /// Sampler algorithm name.
    #[serde(rename = "sampler_name")]
    pub sampler_name: Option<String>,
    /// Default image width.
    pub image_width: Option<u32>,
    /// Default image height.
    pub image_height: Option<u32>,
    /// Default images per request.
    #[serde(rename = "COUNT")]
    pub count: Option<u32>,
    /// Positive prompt fragment prepended to the user's prompt.
    pub default_positive_prompt: Option<String>,
    /// Negative prompt fragment.
    pub default_negative_prompt: Option<String>,
}

/// Process-wide fallbacks from the reserved registry entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalDefaults {
    /// Model used when a request names none.
    #[serde(rename = "MODEL")]
    pub model: Option<String>,
    /// Fallback sampler step count.
    #[serde(rename = "STEPS")]
    pub steps: Option<u32>,
    /// Fallback image width.
    #[serde(rename = "WIDTH")]
    pub width: Option<u32>,
    /// Fallback image height.
    #[serde(rename = "HEIGHT")]
    pub height: Option<u32>,
    /// Fallback images per request.
    #[serde(rename = "COUNT")]
    pub count: Option<u32>,
}

/// Problems loading or querying the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry file could not be read.
    #[error("could not read model configuration: {0}")]
    Io(#[from] std::io::Error),
    /// The registry document was not valid JSON of the expected shape.
    #[error("invalid model configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// The registry defines no models at all.
    #[error("model configuration defines no models")]
    Empty,
}

/// Read-only mapping of model name to generation configuration.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelConfig>,
    defaults: GlobalDefaults,
}

impl ModelRegistry {
    /// Load and parse the registry from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parse the registry from a JSON string.
    pub fn from_json_str(raw: &str) -> Result<Self, RegistryError> {
        let mut entries: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw)?;
        let defaults = match entries.remove(DEFAULTS_KEY) {
            Some(value) => serde_json::from_value(value)?,
            None => GlobalDefaults::default(),
        };
        let mut models = BTreeMap::new();
        for (name, value) in entries {
            models.insert(name, serde_json::from_value(value)?);
        }
        if models.is_empty() {
            return Err(RegistryError::Empty);
        }
        Ok(Self { models, defaults })
    }

    /// Build a registry directly from parts (used by tests and tooling).
    pub fn from_parts(models: BTreeMap<String, ModelConfig>, defaults: GlobalDefaults) -> Self {
        Self { models, defaults }
    }

    /// Process-wide fallback defaults.
    pub fn defaults(&self) -> &GlobalDefaults {
        &self.defaults
    }

    /// Registered model names, excluding the reserved defaults entry.
    pub fn model_names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Resolve a requested model name to a configuration row.
    ///
    /// An unknown name, the reserved key, or no name at all falls back to
    /// the configured default model, and failing that to the first
    /// registered model in lexicographic order.
    pub fn resolve(&self, requested: Option<&str>) -> Result<(&str, &ModelConfig), RegistryError> {
        if let Some(name) = requested {
            if name != DEFAULTS_KEY {
                if let Some((name, config)) = self.models.get_key_value(name) {
                    return Ok((name.as_str(), config));
                }
            }
        }
        if let Some(default_name) = self.defaults.model.as_deref() {
            if let Some((name, config)) = self.models.get_key_value(default_name) {
                return Ok((name.as_str(), config));
            }
        }
        self.models
            .iter()
            .next()
            .map(|(name, config)| (name.as_str(), config))
            .ok_or(RegistryError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "DEFAULTS": {"MODEL": "sdxl", "STEPS": 20, "WIDTH": 1024, "HEIGHT": 1024, "COUNT": 1},
        "sdxl": {
            "workflow": "sdxl_base",
            "checkpointName": "sd_xl_base_1.0.safetensors",
            "steps": 25,
            "cfg": 7.5,
            "sampler_name": "euler",
            "imageWidth": 1024,
            "imageHeight": 1024,
            "defaultPositivePrompt": "masterpiece, best quality",
            "defaultNegativePrompt": "lowres"
        },
        "anime": {
            "workflow": "anime_v3",
            "checkpointName": "anime_v3.safetensors"
        }
    }"#;

    #[test]
    fn parses_models_and_defaults() {
        let registry = ModelRegistry::from_json_str(SAMPLE).unwrap();
        assert_eq!(registry.model_names(), vec!["anime", "sdxl"]);
        assert_eq!(registry.defaults().model.as_deref(), Some("sdxl"));
        assert_eq!(registry.defaults().steps, Some(20));
    }

    #[test]
    fn listing_excludes_reserved_key() {
        let registry = ModelRegistry::from_json_str(SAMPLE).unwrap();
        assert!(!registry.model_names().contains(&DEFAULTS_KEY.to_string()));
    }

    #[test]
    fn resolve_known_model() {
        let registry = ModelRegistry::from_json_str(SAMPLE).unwrap();
        let (name, config) = registry.resolve(Some("anime")).unwrap();
        assert_eq!(name, "anime");
        assert_eq!(config.workflow, "anime_v3");
    }

    #[test]
    fn resolve_unknown_model_uses_default() {
        let registry = ModelRegistry::from_json_str(SAMPLE).unwrap();
        let (name, _) = registry.resolve(Some("nope")).unwrap();
        assert_eq!(name, "sdxl");
    }

    #[test]
    fn resolve_reserved_key_uses_default() {
        let registry = ModelRegistry::from_json_str(SAMPLE).unwrap();
        let (name, _) = registry.resolve(Some(DEFAULTS_KEY)).unwrap();
        assert_eq!(name, "sdxl");
    }

    #[test]
    fn resolve_none_uses_default() {
        let registry = ModelRegistry::from_json_str(SAMPLE).unwrap();
        let (name, _) = registry.resolve(None).unwrap();
        assert_eq!(name, "sdxl");
    }

    #[test]
    fn resolve_without_default_model_is_lexicographic_first() {
        let raw = r#"{
            "zeta": {"workflow": "z"},
            "alpha": {"workflow": "a"}
        }"#;
        let registry = ModelRegistry::from_json_str(raw).unwrap();
        let (name, _) = registry.resolve(None).unwrap();
        assert_eq!(name, "alpha");
    }

    #[test]
    fn empty_registry_is_rejected() {
        assert!(matches!(
            ModelRegistry::from_json_str("{}"),
            Err(RegistryError::Empty)
        ));
        let only_defaults = r#"{"DEFAULTS": {"MODEL": "x"}}"#;
        assert!(matches!(
            ModelRegistry::from_json_str(only_defaults),
            Err(RegistryError::Empty)
        ));
    }
}
