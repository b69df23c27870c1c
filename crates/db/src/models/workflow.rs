use hyperflow_core::{Workflow, WorkflowStatus};

use super::millis_to_datetime;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkflowRow {
    pub id: i64,
    pub user_request: String,
    pub status: String,
    pub created_at: i64,
}

impl WorkflowRow {
    pub fn into_domain(self) -> Workflow {
        Workflow {
            id: self.id,
            user_request: self.user_request,
            status: WorkflowStatus::parse(&self.status).unwrap_or_default(),
            created_at: millis_to_datetime(self.created_at),
        }
    }
}
