use hyperflow_core::WorkflowId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    /// The attempt no longer owns the job: it was reclaimed or already settled.
    #[error("Job {id} is no longer held by attempt {attempt}")]
    ClaimLost { id: String, attempt: u32 },

    #[error("Corrupt {table} row: {reason}")]
    InvalidRow { table: &'static str, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    pub(crate) fn invalid_row(table: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidRow {
            table,
            reason: reason.into(),
        }
    }
}
