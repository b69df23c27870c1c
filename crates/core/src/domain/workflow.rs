use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::CoreError;

/// Store-assigned numeric workflow identifier.
pub type WorkflowId = i64;

/// Upper bound on the length of a submitted request, in characters.
pub const MAX_USER_REQUEST_CHARS: usize = 10_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user request's end-to-end orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Workflow {
    pub id: WorkflowId,
    pub user_request: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
}

/// Parses a workflow id taken from a URL or CLI argument.
pub fn parse_workflow_id(raw: &str) -> Result<WorkflowId, CoreError> {
    raw.trim()
        .parse::<WorkflowId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| CoreError::InvalidWorkflowId(raw.to_string()))
}

/// Execution options accepted at submission time.
///
/// Neither field is consulted by the pipeline yet; they are validated and
/// logged so clients can start sending them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowRequest {
    pub user_request: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<WorkflowOptions>,
}

impl CreateWorkflowRequest {
    pub fn new(user_request: impl Into<String>) -> Self {
        Self {
            user_request: user_request.into(),
            options: None,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.user_request.trim().is_empty() {
            return Err(CoreError::Validation(
                "userRequest cannot be empty".to_string(),
            ));
        }

        let chars = self.user_request.chars().count();
        if chars > MAX_USER_REQUEST_CHARS {
            return Err(CoreError::Validation(format!(
                "userRequest is {} characters long (max {})",
                chars, MAX_USER_REQUEST_CHARS
            )));
        }

        Ok(())
    }
}
