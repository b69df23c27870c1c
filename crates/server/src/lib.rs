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
        title = "Hyperflow API",
        version = "0.1.0",
        description = "Submit multi-agent workflows and poll their status"
    ),
    paths(
        routes::health_check,
        routes::readiness_check,
        routes::create_workflow,
        routes::get_workflow,
    ),
    components(schemas(
        hyperflow_core::CreateWorkflowRequest,
        hyperflow_core::WorkflowOptions,
        hyperflow_core::WorkflowStatus,
        routes::CreateWorkflowResponse,
        routes::WorkflowStatusResponse,
        routes::HealthResponse,
        routes::ReadinessResponse,
        routes::JobCountsResponse,
        error::ErrorResponse,
    )),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "workflows", description = "Workflow submission and status")
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .route("/ready", get(routes::readiness_check))
        .route("/api/workflows", post(routes::create_workflow))
        .route("/api/workflows/{id}", get(routes::get_workflow))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
