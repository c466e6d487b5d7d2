use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use insights_core::{RestaurantProfile, Stage, StageInputs};
use orchestrator::{PipelineError, SessionListEntry, StatusView};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub cuisine: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RunAccepted {
    pub session_id: Uuid,
    /// Stage the run continues after.
    pub resume_point: Stage,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkFailedRequest {
    pub reason: String,
}

#[utoipa::path(
    post,
    path = "/api/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = CreateSessionResponse),
        (status = 400, description = "Invalid request")
    ),
    tag = "sessions"
)]
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("Restaurant name is required".to_string()));
    }

    let mut profile = RestaurantProfile::new(request.name.trim());
    profile.location = request.location.filter(|l| !l.trim().is_empty());
    profile.cuisine = request.cuisine.filter(|c| !c.trim().is_empty());

    let session_id = state.orchestrator.create_session(profile).await?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id })))
}

#[utoipa::path(
    get,
    path = "/api/sessions",
    responses(
        (status = 200, description = "Known sessions", body = Vec<SessionListEntry>)
    ),
    tag = "sessions"
)]
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionListEntry>>, AppError> {
    Ok(Json(state.orchestrator.list_sessions().await?))
}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Session status", body = StatusView),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusView>, AppError> {
    state
        .orchestrator
        .get_status(id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", id)))
}

#[utoipa::path(
    delete,
    path = "/api/sessions/{id}",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session is running")
    ),
    tag = "sessions"
)]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.orchestrator.delete_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/run",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    request_body = StageInputs,
    responses(
        (status = 202, description = "Pipeline started in the background", body = RunAccepted),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session already completed or running")
    ),
    tag = "sessions"
)]
pub async fn run_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(inputs): Json<StageInputs>,
) -> Result<(StatusCode, Json<RunAccepted>), AppError> {
    let status = state
        .orchestrator
        .get_status(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", id)))?;
    if status.is_completed() {
        return Err(AppError::Conflict(format!("Session {} is already completed", id)));
    }
    if state.orchestrator.is_running(id) {
        return Err(AppError::Conflict(format!("Session {} is already running", id)));
    }

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        match orchestrator.run(id, inputs).await {
            Ok(report) => info!(
                session_id = %id,
                checkpoints = report.checkpoints.len(),
                "Background pipeline run finished"
            ),
            Err(PipelineError::StageExecution { stage, message, .. }) => warn!(
                session_id = %id,
                stage = %stage,
                error = %message,
                "Background pipeline run failed"
            ),
            Err(e) => warn!(session_id = %id, error = %e, "Background pipeline run aborted"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            session_id: id,
            resume_point: status.resume_point,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/resume",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Session loaded for resumption", body = StatusView),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn resume_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusView>, AppError> {
    state
        .orchestrator
        .resume(id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", id)))
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/fail",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    request_body = MarkFailedRequest,
    responses(
        (status = 200, description = "Session marked failed", body = StatusView),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session already completed")
    ),
    tag = "sessions"
)]
pub async fn mark_session_failed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<MarkFailedRequest>,
) -> Result<Json<StatusView>, AppError> {
    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(AppError::BadRequest("A reason is required".to_string()));
    }
    let view = state.orchestrator.mark_failed(id, reason).await?;
    Ok(Json(view))
}
