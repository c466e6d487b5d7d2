pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Restaurant Insights API",
        version = "0.1.0",
        description = "Runs restaurant analysis sessions through the staged insights pipeline"
    ),
    paths(
        routes::health_check,
        routes::create_session,
        routes::list_sessions,
        routes::get_session,
        routes::delete_session,
        routes::run_session,
        routes::resume_session,
        routes::mark_session_failed,
        routes::sse::session_progress_stream,
        routes::sse::events_stream,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::CreateSessionRequest,
        routes::CreateSessionResponse,
        routes::RunAccepted,
        routes::MarkFailedRequest,
        error::ErrorResponse,
        orchestrator::StatusView,
        orchestrator::StageStatus,
        orchestrator::SessionListEntry,
        insights_core::StageInputs,
        insights_core::MenuImage,
        insights_core::DishImage,
        insights_core::RestaurantProfile,
        insights_core::Stage,
        insights_core::StageState,
        insights_core::Checkpoint,
        insights_core::SkipReason,
        insights_core::StageSkip,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Analysis session endpoints"),
        (name = "events", description = "Real-time event streaming (SSE)"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .route(
            "/api/sessions",
            get(routes::list_sessions).post(routes::create_session),
        )
        .route(
            "/api/sessions/{id}",
            get(routes::get_session).delete(routes::delete_session),
        )
        .route("/api/sessions/{id}/run", post(routes::run_session))
        .route("/api/sessions/{id}/resume", post(routes::resume_session))
        .route("/api/sessions/{id}/fail", post(routes::mark_session_failed))
        .route(
            "/api/sessions/{id}/progress",
            get(routes::sse::session_progress_stream),
        )
        .route("/api/events", get(routes::sse::events_stream))
        .route("/ws", get(routes::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
