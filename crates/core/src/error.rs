use thiserror::Error;

use crate::domain::WorkflowId;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    #[error("Invalid workflow id: {0}")]
    InvalidWorkflowId(String),

    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
