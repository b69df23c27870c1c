use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use hyperflow_core::{parse_workflow_id, CreateWorkflowRequest, WorkflowId, WorkflowStatus};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{AppError, ErrorResponse};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowResponse {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatusResponse {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    pub user_request: String,
    pub created_at: DateTime<Utc>,
}

#[utoipa::path(
    post,
    path = "/api/workflows",
    request_body = CreateWorkflowRequest,
    responses(
        (status = 202, description = "Workflow accepted and queued", body = CreateWorkflowResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Workflow could not be enqueued", body = ErrorResponse)
    ),
    tag = "workflows"
)]
pub async fn create_workflow(
    State(state): State<AppState>,
    payload: Result<Json<CreateWorkflowRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateWorkflowResponse>), AppError> {
    let Json(request) = payload?;

    if let Some(options) = &request.options {
        tracing::debug!(
            timeout = ?options.timeout,
            retry_limit = ?options.retry_limit,
            "Workflow options received"
        );
    }

    let submitted = state.service.submit(&request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateWorkflowResponse {
            workflow_id: submitted.workflow.id,
            status: submitted.workflow.status,
            created_at: submitted.workflow.created_at,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/workflows/{id}",
    params(("id" = String, Path, description = "Workflow id")),
    responses(
        (status = 200, description = "Workflow status", body = WorkflowStatusResponse),
        (status = 400, description = "Invalid ID format", body = ErrorResponse),
        (status = 404, description = "Workflow not found", body = ErrorResponse)
    ),
    tag = "workflows"
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowStatusResponse>, AppError> {
    let id = parse_workflow_id(&id)?;
    let workflow = state.service.get(id).await?;

    Ok(Json(WorkflowStatusResponse {
        workflow_id: workflow.id,
        status: workflow.status,
        user_request: workflow.user_request,
        created_at: workflow.created_at,
    }))
}
