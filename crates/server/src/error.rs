use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hyperflow_core::CoreError;
use orchestrator::OrchestratorError;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Orchestrator(OrchestratorError),
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Orchestrator(err) => match err {
                OrchestratorError::WorkflowNotFound(_)
                | OrchestratorError::Invalid(CoreError::WorkflowNotFound(_)) => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    "Workflow not found".to_string(),
                ),
                OrchestratorError::Invalid(CoreError::InvalidWorkflowId(_)) => (
                    StatusCode::BAD_REQUEST,
                    "bad_request",
                    "Invalid ID format".to_string(),
                ),
                OrchestratorError::Invalid(CoreError::Validation(msg)) => {
                    (StatusCode::BAD_REQUEST, "validation_error", msg)
                }
                OrchestratorError::Invalid(other) => {
                    (StatusCode::BAD_REQUEST, "bad_request", other.to_string())
                }
                other => {
                    tracing::error!(error = %other, "Request failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal_error",
                        "Internal server error".to_string(),
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

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        AppError::Orchestrator(err)
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        AppError::Orchestrator(OrchestratorError::Invalid(err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::from(OrchestratorError::WorkflowNotFound(7)), StatusCode::NOT_FOUND),
            (
                AppError::from(CoreError::InvalidWorkflowId("abc".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(CoreError::Validation("userRequest cannot be empty".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(OrchestratorError::GenerationFailed("empty".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
