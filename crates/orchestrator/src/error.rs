use hyperflow_core::{CoreError, WorkflowId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    #[error("Invalid request: {0}")]
    Invalid(#[from] CoreError),

    #[error("Generation failed: {0}")]
    Generation(#[from] llm::LlmError),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),
}

impl OrchestratorError {
    /// Whether another attempt of the same job could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::WorkflowNotFound(_) | Self::Invalid(_) | Self::InvalidTransition { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
