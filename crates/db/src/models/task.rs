use hyperflow_core::{AgentType, Task, TaskStatus};

use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: i64,
    pub workflow_id: i64,
    pub agent_type: String,
    pub name: String,
    pub input: Option<String>,
    pub output: Option<String>,
    pub status: String,
}

impl TaskRow {
    pub fn into_domain(self) -> Result<Task, DbError> {
        let agent_type = AgentType::parse(&self.agent_type).ok_or_else(|| {
            DbError::invalid_row("tasks", format!("unknown agent type {}", self.agent_type))
        })?;

        Ok(Task {
            id: self.id,
            workflow_id: self.workflow_id,
            agent_type,
            name: self.name,
            input: self.input,
            output: self.output,
            status: TaskStatus::parse(&self.status).unwrap_or_default(),
        })
    }
}
