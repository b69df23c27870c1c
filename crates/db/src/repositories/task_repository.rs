use chrono::Utc;
use hyperflow_core::{NewTask, Task, TaskStatus, WorkflowId};
use sqlx::SqlitePool;

use crate::error::DbError;
use crate::models::{datetime_to_millis, TaskRow};

#[derive(Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Records a subtask as `pending`. Rows are never updated afterwards.
    pub async fn create_pending(&self, task: &NewTask) -> Result<Task, DbError> {
        let row: TaskRow = sqlx::query_as(
            r#"
            INSERT INTO tasks (workflow_id, agent_type, name, input, output, status, created_at)
            VALUES (?, ?, ?, ?, NULL, ?, ?)
            RETURNING id, workflow_id, agent_type, name, input, output, status
            "#,
        )
        .bind(task.workflow_id)
        .bind(task.agent_type.as_str())
        .bind(&task.name)
        .bind(&task.input)
        .bind(TaskStatus::Pending.as_str())
        .bind(datetime_to_millis(Utc::now()))
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    pub async fn find_by_workflow(&self, workflow_id: WorkflowId) -> Result<Vec<Task>, DbError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"
            SELECT id, workflow_id, agent_type, name, input, output, status
            FROM tasks
            WHERE workflow_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }
}
