//! The HTTP surface.
//!
//! Thin handlers over [`QueueService`]: submission returns immediately with
//! an id and queue position; callers then poll `/job/{id}` or block on
//! `/wait/{id}`. Error bodies carry a single `detail` field.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{JobNotFound, JobSnapshot, QueueService};

/// Body of `POST /request`.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Raw request message, free text plus optional flags.
    pub message: String,
    /// Display name of the submitter, used for logging only.
    pub nick: String,
}

/// Body of a successful `POST /request` response.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    /// Opaque id for later `/job/{id}` and `/wait/{id}` lookups.
    pub job_id: String,
    /// Best-effort dispatch position, counting the new job itself.
    pub queue_position: usize,
}

#[derive(Debug, Serialize)]
struct ModelsResponse {
    models: Vec<String>,
}

/// API error with the HTTP status it maps to.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl From<JobNotFound> for ApiError {
    fn from(e: JobNotFound) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: e.to_string(),
        }
    }
}

impl From<crate::core::QueueClosed> for ApiError {
    fn from(e: crate::core::QueueClosed) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            detail: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.detail });
        (self.status, Json(body)).into_response()
    }
}

/// Build the service router.
pub fn router(service: Arc<QueueService>) -> Router {
    Router::new()
        .route("/request", post(request_generation))
        .route("/job/{job_id}", get(job_status))
        .route("/wait/{job_id}", get(wait_for_job))
        .route("/models", get(list_models))
        .with_state(service)
}

async fn request_generation(
    State(service): State<Arc<QueueService>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    debug!(nick = %request.nick, "generation requested");
    let receipt = service.submit(request.message, request.nick)?;
    Ok(Json(GenerateResponse {
        job_id: receipt.job_id,
        queue_position: receipt.queue_position,
    }))
}

async fn job_status(
    State(service): State<Arc<QueueService>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    Ok(Json(service.status(&job_id)?))
}

async fn wait_for_job(
    State(service): State<Arc<QueueService>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    Ok(Json(service.wait(&job_id).await?))
}

async fn list_models(State(service): State<Arc<QueueService>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: service.models(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_serializes_detail() {
        let err = ApiError::from(JobNotFound("abc".to_string()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.detail, "job not found: abc");
    }
}
