use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize, ToSchema)]
pub struct JobCountsResponse {
    waiting: u64,
    active: u64,
    failed: u64,
}

#[derive(Serialize, ToSchema)]
pub struct ReadinessResponse {
    status: String,
    queue: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    jobs: Option<JobCountsResponse>,
}

impl ReadinessResponse {
    fn not_ready() -> Self {
        Self {
            status: "not_ready".to_string(),
            queue: "unreachable".to_string(),
            jobs: None,
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Queue store reachable", body = ReadinessResponse),
        (status = 503, description = "Queue store unreachable", body = ReadinessResponse)
    ),
    tag = "health"
)]
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    if let Err(e) = state.queue.ping().await {
        tracing::warn!(error = %e, "Readiness check failed");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse::not_ready()),
        );
    }

    match state.queue.counts().await {
        Ok(counts) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready".to_string(),
                queue: "reachable".to_string(),
                jobs: Some(JobCountsResponse {
                    waiting: counts.waiting,
                    active: counts.active,
                    failed: counts.failed,
                }),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read job counts");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse::not_ready()),
            )
        }
    }
}
