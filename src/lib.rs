//! # fategen
//!
//! A queued image-generation service for ComfyUI-compatible backends.
//!
//! The service accepts free-text generation requests, holds them in strict
//! arrival order, and runs at most `MAX_CONCURRENT_JOBS` of them (default 1,
//! i.e. true single-flight FIFO) against a GPU-bound ComfyUI server reachable
//! over HTTP and a streaming WebSocket. Each job is tracked through a
//! `queued -> processing -> {completed | failed}` lifecycle that callers can
//! poll or block on, and an idle-reclamation timer asks the backend to unload
//! VRAM after a configurable quiet period.
//!
//! ## Architecture
//!
//! - [`core`] - the job queue, worker pool, idle reclaimer, and error
//!   taxonomy. This is the heart of the service: arrival ordering,
//!   single-owner job occupancy, waiter liveness, and failure isolation all
//!   live here.
//! - [`backend`] - the ComfyUI adapter: workflow submission over HTTP,
//!   artifact streaming over WebSocket, VRAM release.
//! - [`prompt`] - the user-facing command mini-language and the workflow
//!   compiler that merges user overrides, model configuration, and global
//!   defaults into a backend request document.
//! - [`config`] - environment configuration and the model registry.
//! - [`output`] - artifact persistence, grid compositing, and public URL
//!   mapping.
//! - [`server`] - the axum HTTP surface.
//!
//! ## Example
//!
//! ```rust,ignore
//! let registry = Arc::new(ModelRegistry::from_path(&cfg.model_config_path)?);
//! let backend = Arc::new(ComfyBackend::new(cfg.http_url(), cfg.ws_url()));
//! let runner = Arc::new(GenerationPipeline::new(
//!     Arc::clone(&registry),
//!     WorkflowLibrary::new(cfg.workflow_dir.clone()),
//!     backend.clone(),
//!     OutputStore::new(cfg.output_dir.clone()),
//!     cfg.web_domain.clone(),
//! ));
//! let service = QueueService::start(cfg.queue_options(), registry, runner, backend);
//!
//! let receipt = service.submit("a castle --width 768 -m sdxl", "alice")?;
//! let snapshot = service.wait(&receipt.job_id).await?;
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

/// ComfyUI backend adapter: HTTP submission, WebSocket streaming, VRAM release.
pub mod backend;
/// Environment configuration and the model-configuration registry.
pub mod config;
/// Job model, queue service, worker pool, idle reclaimer, and errors.
pub mod core;
/// Artifact persistence, grid compositing, and filename/URL mapping.
pub mod output;
/// The `--flag` command parser and the workflow compiler.
pub mod prompt;
/// HTTP API surface.
pub mod server;
/// Tracing initialization helper.
pub mod telemetry;
