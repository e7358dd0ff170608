//! Service configuration and the model-configuration registry.

mod models;
mod service;

pub use models::{GlobalDefaults, ModelConfig, ModelRegistry, RegistryError, DEFAULTS_KEY};
pub use service::{ConfigError, ServiceConfig};
