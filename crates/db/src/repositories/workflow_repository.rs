use chrono::Utc;
use hyperflow_core::{Workflow, WorkflowId, WorkflowStatus};
use sqlx::SqlitePool;

use crate::error::DbError;
use crate::models::{datetime_to_millis, WorkflowRow};

#[derive(Clone)]
pub struct WorkflowRepository {
    pool: SqlitePool,
}

impl WorkflowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a new workflow in `queued` status and returns it with its id.
    pub async fn create(&self, user_request: &str) -> Result<Workflow, DbError> {
        let now = Utc::now();

        let row: WorkflowRow = sqlx::query_as(
            r#"
            INSERT INTO workflows (user_request, status, created_at)
            VALUES (?, ?, ?)
            RETURNING id, user_request, status, created_at
            "#,
        )
        .bind(user_request)
        .bind(WorkflowStatus::Queued.as_str())
        .bind(datetime_to_millis(now))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_domain())
    }

    pub async fn find_by_id(&self, id: WorkflowId) -> Result<Option<Workflow>, DbError> {
        let row: Option<WorkflowRow> = sqlx::query_as(
            r#"
            SELECT id, user_request, status, created_at
            FROM workflows
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    pub async fn find_by_statuses(
        &self,
        statuses: &[WorkflowStatus],
    ) -> Result<Vec<Workflow>, DbError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT id, user_request, status, created_at FROM workflows WHERE status IN ({}) ORDER BY id ASC",
            placeholders
        );

        let mut query = sqlx::query_as::<_, WorkflowRow>(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    /// Writes a new status. Returns `WorkflowNotFound` when no row matched.
    pub async fn update_status(&self, id: WorkflowId, status: WorkflowStatus) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE workflows SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::WorkflowNotFound(id));
        }

        Ok(())
    }
}
