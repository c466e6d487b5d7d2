use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orchestrator::PipelineError;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
    Pipeline(PipelineError),
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::Pipeline(err) => match err {
                PipelineError::SessionNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("Session not found: {}", id),
                ),
                PipelineError::InvalidState(msg) => (StatusCode::CONFLICT, "conflict", msg),
                PipelineError::Stopped { .. } => {
                    (StatusCode::CONFLICT, "conflict", err.to_string())
                }
                PipelineError::StageExecution { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "stage_failed", err.to_string())
                }
                PipelineError::Store(ref e) => {
                    tracing::error!(error = %e, "Session store error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "store_error",
                        "Session store error occurred".to_string(),
                    )
                }
            },
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}
