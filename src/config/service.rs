//! Environment-driven service configuration.
//!
//! All knobs come from environment variables (optionally via a `.env` file
//! loaded by the binary), matching how the service is deployed. Every value
//! has a default suitable for a local ComfyUI on the standard port.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::QueueOptions;

/// Configuration problems detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value of the wrong shape.
    #[error("invalid value for {name}: {value:?}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
    /// A validation rule failed after parsing.
    #[error("{0}")]
    Validation(String),
}

/// Process-wide configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// ComfyUI host name or address.
    pub comfyui_address: String,
    /// ComfyUI port.
    pub comfyui_port: u16,
    /// Directory generated images are written to.
    pub output_dir: PathBuf,
    /// Public base URL for results; empty means report local paths.
    pub web_domain: String,
    /// Concurrency ceiling for the worker pool.
    pub max_concurrent_jobs: usize,
    /// Quiet period before backend VRAM is released.
    pub inactivity_delay: Duration,
    /// Path to the model-configuration JSON document.
    pub model_config_path: PathBuf,
    /// Directory holding workflow templates (`<name>.json`).
    pub workflow_dir: PathBuf,
    /// Address the HTTP server binds to.
    pub bind_addr: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            comfyui_address: "127.0.0.1".to_string(),
            comfyui_port: 8188,
            output_dir: PathBuf::from("./output"),
            web_domain: String::new(),
            max_concurrent_jobs: 1,
            inactivity_delay: Duration::from_secs(10 * 60),
            model_config_path: PathBuf::from("config/modelConfiguration.json"),
            workflow_dir: PathBuf::from("workflows"),
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Read configuration from the environment, falling back to defaults
    /// for unset variables, then validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let cfg = Self {
            comfyui_address: env_string("COMFYUI_ADDRESS", defaults.comfyui_address),
            comfyui_port: env_parse("COMFYUI_PORT", defaults.comfyui_port)?,
            output_dir: env_string("COMFYUI_FOLDER_PATH", "./output".to_string()).into(),
            web_domain: env_string("WEB_DOMAIN", defaults.web_domain),
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs)?,
            inactivity_delay: Duration::from_secs(env_parse(
                "INACTIVITY_DELAY_SECS",
                defaults.inactivity_delay.as_secs(),
            )?),
            model_config_path: env_string(
                "MODEL_CONFIG_PATH",
                defaults.model_config_path.to_string_lossy().into_owned(),
            )
            .into(),
            workflow_dir: env_string(
                "WORKFLOW_DIR",
                defaults.workflow_dir.to_string_lossy().into_owned(),
            )
            .into(),
            bind_addr: env_string("BIND_ADDR", defaults.bind_addr),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate parsed values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Validation(
                "MAX_CONCURRENT_JOBS must be at least 1".to_string(),
            ));
        }
        if self.comfyui_port == 0 {
            return Err(ConfigError::Validation(
                "COMFYUI_PORT must be non-zero".to_string(),
            ));
        }
        if self.inactivity_delay.is_zero() {
            return Err(ConfigError::Validation(
                "INACTIVITY_DELAY_SECS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Base HTTP URL of the backend, e.g. `http://127.0.0.1:8188`.
    pub fn http_url(&self) -> String {
        format!("http://{}:{}", self.comfyui_address, self.comfyui_port)
    }

    /// Base WebSocket URL of the backend, e.g. `ws://127.0.0.1:8188`.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.comfyui_address, self.comfyui_port)
    }

    /// Queue engine options derived from this configuration.
    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            worker_count: self.max_concurrent_jobs,
            idle_delay: self.inactivity_delay,
        }
    }
}

fn env_string(name: &'static str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value,
        }),
        Err(_) => Ok(default),
    }
}
