use chrono::{DateTime, Utc};
use hyperflow_core::{ExhaustedJob, Job, JobCounts, JobState, NewJob, StalledJobs};
use sqlx::{Row, SqlitePool};

use crate::error::DbError;
use crate::models::{datetime_to_millis, JobRow, JOB_COLUMNS};

pub const STALLED_ERROR: &str = "job stalled while active";
pub const STALLED_EXHAUSTED_ERROR: &str = "job stalled while active and has no attempts left";

/// Persistence for queue jobs.
///
/// Claims are single statements, so a job is claimed by at most one worker
/// even when several pools share the database. Every later write names the
/// attempt that holds the claim and is rejected once that claim is gone.
#[derive(Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Inserts a waiting job. Returns `false` if a job with the same id exists.
    pub async fn insert(&self, job: &NewJob) -> Result<bool, DbError> {
        let created_at = datetime_to_millis(job.created_at);

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, name, payload, state, attempts, attempts_made, backoff_kind,
                              backoff_delay_ms, remove_on_complete, remove_on_fail, progress,
                              run_at, created_at)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&job.id)
        .bind(&job.name)
        .bind(serde_json::to_string(&job.payload)?)
        .bind(JobState::Waiting.as_str())
        .bind(i64::from(job.options.attempts))
        .bind(job.options.backoff.kind.as_str())
        .bind(job.options.backoff.delay_ms as i64)
        .bind(job.options.remove_on_complete)
        .bind(job.options.remove_on_fail)
        .bind(created_at)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Moves the oldest due waiting job to `active` and counts the attempt.
    pub async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>, DbError> {
        let now_ms = datetime_to_millis(now);
        let sql = format!(
            r#"
            UPDATE jobs
            SET state = 'active', attempts_made = attempts_made + 1, started_at = ?,
                heartbeat_at = ?, progress = 0
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = 'waiting' AND run_at <= ?
                ORDER BY run_at ASC, created_at ASC, id ASC
                LIMIT 1
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(now_ms)
            .bind(now_ms)
            .bind(now_ms)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_domain()).transpose()
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Job>, DbError> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_domain()).transpose()
    }

    /// Renews the claim held by `attempt`. Returns `false` once the claim is lost.
    pub async fn heartbeat(
        &self,
        id: &str,
        attempt: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE jobs SET heartbeat_at = ? WHERE id = ? AND state = 'active' AND attempts_made = ?",
        )
        .bind(datetime_to_millis(now))
        .bind(id)
        .bind(i64::from(attempt))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn update_progress(&self, id: &str, attempt: u32, progress: u8) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE jobs SET progress = ? WHERE id = ? AND state = 'active' AND attempts_made = ?",
        )
        .bind(i64::from(progress.min(100)))
        .bind(id)
        .bind(i64::from(attempt))
        .execute(&self.pool)
        .await?;

        claimed(result.rows_affected(), id, attempt)
    }

    /// Marks the claimed attempt completed, or deletes the job when `remove` is set.
    pub async fn complete(
        &self,
        id: &str,
        attempt: u32,
        now: DateTime<Utc>,
        remove: bool,
    ) -> Result<(), DbError> {
        let result = if remove {
            sqlx::query("DELETE FROM jobs WHERE id = ? AND state = 'active' AND attempts_made = ?")
                .bind(id)
                .bind(i64::from(attempt))
                .execute(&self.pool)
                .await?
        } else {
            sqlx::query(
                r#"
                UPDATE jobs SET state = 'completed', finished_at = ?, last_error = NULL
                WHERE id = ? AND state = 'active' AND attempts_made = ?
                "#,
            )
            .bind(datetime_to_millis(now))
            .bind(id)
            .bind(i64::from(attempt))
            .execute(&self.pool)
            .await?
        };

        claimed(result.rows_affected(), id, attempt)
    }

    /// Returns a failed attempt to `waiting`, due again at `run_at`.
    pub async fn schedule_retry(
        &self,
        id: &str,
        attempt: u32,
        error: &str,
        run_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'waiting', run_at = ?, last_error = ?, started_at = NULL, heartbeat_at = NULL
            WHERE id = ? AND state = 'active' AND attempts_made = ?
            "#,
        )
        .bind(datetime_to_millis(run_at))
        .bind(error)
        .bind(id)
        .bind(i64::from(attempt))
        .execute(&self.pool)
        .await?;

        claimed(result.rows_affected(), id, attempt)
    }

    /// Records a terminal failure. The row is kept unless `remove` is set.
    pub async fn fail(
        &self,
        id: &str,
        attempt: u32,
        error: &str,
        now: DateTime<Utc>,
        remove: bool,
    ) -> Result<(), DbError> {
        let result = if remove {
            sqlx::query("DELETE FROM jobs WHERE id = ? AND state = 'active' AND attempts_made = ?")
                .bind(id)
                .bind(i64::from(attempt))
                .execute(&self.pool)
                .await?
        } else {
            sqlx::query(
                r#"
                UPDATE jobs SET state = 'failed', last_error = ?, finished_at = ?
                WHERE id = ? AND state = 'active' AND attempts_made = ?
                "#,
            )
            .bind(error)
            .bind(datetime_to_millis(now))
            .bind(id)
            .bind(i64::from(attempt))
            .execute(&self.pool)
            .await?
        };

        claimed(result.rows_affected(), id, attempt)
    }

    /// Sweeps active jobs whose last heartbeat is older than `heartbeat_before`.
    ///
    /// Jobs with attempts left go back to `waiting`. Exhausted jobs fail
    /// terminally, or are deleted when they have `remove_on_fail` set.
    pub async fn reclaim_stalled(
        &self,
        heartbeat_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<StalledJobs, DbError> {
        let cutoff = datetime_to_millis(heartbeat_before);
        let now_ms = datetime_to_millis(now);
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE state = 'active' AND heartbeat_at < ? AND attempts_made >= attempts
              AND remove_on_fail = 1
            RETURNING id, attempts_made
            "#,
        )
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await?;

        let exhausted = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'failed', finished_at = ?, last_error = ?
            WHERE state = 'active' AND heartbeat_at < ? AND attempts_made >= attempts
            RETURNING id, attempts_made
            "#,
        )
        .bind(now_ms)
        .bind(STALLED_EXHAUSTED_ERROR)
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await?;

        let requeued = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'waiting', run_at = ?, started_at = NULL, heartbeat_at = NULL,
                last_error = ?
            WHERE state = 'active' AND heartbeat_at < ?
            RETURNING id
            "#,
        )
        .bind(now_ms)
        .bind(STALLED_ERROR)
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let failed = removed
            .iter()
            .chain(exhausted.iter())
            .map(|row| ExhaustedJob {
                id: row.get("id"),
                attempts_made: row.get::<i64, _>("attempts_made").max(0) as u32,
            })
            .collect();

        Ok(StalledJobs {
            requeued: requeued.iter().map(|row| row.get("id")).collect(),
            failed,
        })
    }

    pub async fn counts(&self) -> Result<JobCounts, DbError> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS total FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = JobCounts::default();
        for row in rows {
            let state: String = row.get("state");
            let total = row.get::<i64, _>("total").max(0) as u64;
            match JobState::parse(&state) {
                Some(JobState::Waiting) => counts.waiting = total,
                Some(JobState::Active) => counts.active = total,
                Some(JobState::Completed) => counts.completed = total,
                Some(JobState::Failed) => counts.failed = total,
                None => tracing::warn!(state = %state, "Ignoring jobs in unknown state"),
            }
        }
        Ok(counts)
    }
}

fn claimed(rows_affected: u64, id: &str, attempt: u32) -> Result<(), DbError> {
    if rows_affected == 0 {
        return Err(DbError::ClaimLost {
            id: id.to_string(),
            attempt,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::test_support::setup_test_db;
    use chrono::Duration;
    use hyperflow_core::JobOptions;
    use serde_json::json;

    fn new_job(id: &str, created_at: DateTime<Utc>) -> NewJob {
        NewJob {
            id: id.to_string(),
            name: "process-workflow".to_string(),
            payload: json!({"workflowId": 1}),
            options: JobOptions::default(),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let (pool, _dir) = setup_test_db().await;
        let repo = JobRepository::new(pool);

        assert!(repo.insert(&new_job("job-1", Utc::now())).await.unwrap());

        let job = repo.find_by_id("job-1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.attempts_made, 0);
        assert_eq!(job.options, JobOptions::default());
        assert_eq!(job.payload, json!({"workflowId": 1}));
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_ignored() {
        let (pool, _dir) = setup_test_db().await;
        let repo = JobRepository::new(pool);

        assert!(repo.insert(&new_job("job-1", Utc::now())).await.unwrap());
        assert!(!repo.insert(&new_job("job-1", Utc::now())).await.unwrap());
        assert_eq!(repo.counts().await.unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_and_ordered() {
        let (pool, _dir) = setup_test_db().await;
        let repo = JobRepository::new(pool);
        let now = Utc::now();

        repo.insert(&new_job("second", now)).await.unwrap();
        repo.insert(&new_job("first", now - Duration::seconds(5)))
            .await
            .unwrap();

        let claimed = repo.claim_next(Utc::now()).await.unwrap().unwrap();
        assert_eq!(claimed.id, "first");
        assert_eq!(claimed.state, JobState::Active);
        assert_eq!(claimed.attempts_made, 1);

        let next = repo.claim_next(Utc::now()).await.unwrap().unwrap();
        assert_eq!(next.id, "second");
        assert!(repo.claim_next(Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retry_is_not_due_before_run_at() {
        let (pool, _dir) = setup_test_db().await;
        let repo = JobRepository::new(pool);
        let now = Utc::now();

        repo.insert(&new_job("job-1", now)).await.unwrap();
        repo.claim_next(now).await.unwrap().unwrap();
        repo.schedule_retry("job-1", 1, "boom", now + Duration::seconds(60))
            .await
            .unwrap();

        assert!(repo.claim_next(now).await.unwrap().is_none());

        let later = repo
            .claim_next(now + Duration::seconds(61))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(later.attempts_made, 2);
        assert_eq!(later.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_complete_removes_row() {
        let (pool, _dir) = setup_test_db().await;
        let repo = JobRepository::new(pool);

        repo.insert(&new_job("job-1", Utc::now())).await.unwrap();
        repo.claim_next(Utc::now()).await.unwrap();
        repo.complete("job-1", 1, Utc::now(), true).await.unwrap();

        assert!(repo.find_by_id("job-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_failure_is_retained() {
        let (pool, _dir) = setup_test_db().await;
        let repo = JobRepository::new(pool);

        repo.insert(&new_job("job-1", Utc::now())).await.unwrap();
        repo.claim_next(Utc::now()).await.unwrap();
        repo.fail("job-1", 1, "exhausted", Utc::now(), false)
            .await
            .unwrap();

        let failed = repo.find_by_id("job-1").await.unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("exhausted"));
        assert!(failed.finished_at.is_some());
        assert_eq!(repo.counts().await.unwrap().failed, 1);
    }

    #[tokio::test]
    async fn test_progress_requires_active_job() {
        let (pool, _dir) = setup_test_db().await;
        let repo = JobRepository::new(pool);

        repo.insert(&new_job("job-1", Utc::now())).await.unwrap();
        assert!(repo.update_progress("job-1", 1, 10).await.is_err());

        repo.claim_next(Utc::now()).await.unwrap();
        repo.update_progress("job-1", 1, 10).await.unwrap();
        let job = repo.find_by_id("job-1").await.unwrap().unwrap();
        assert_eq!(job.progress, 10);
    }

    #[tokio::test]
    async fn test_reclaim_stalled() {
        let (pool, _dir) = setup_test_db().await;
        let repo = JobRepository::new(pool);
        let started = Utc::now() - Duration::minutes(10);

        repo.insert(&new_job("job-1", started)).await.unwrap();
        repo.claim_next(started).await.unwrap();

        let fresh = repo
            .reclaim_stalled(started - Duration::minutes(1), Utc::now())
            .await
            .unwrap();
        assert!(fresh.is_empty());

        let reclaimed = repo
            .reclaim_stalled(Utc::now() - Duration::minutes(5), Utc::now())
            .await
            .unwrap();
        assert_eq!(reclaimed.requeued, vec!["job-1".to_string()]);
        assert!(reclaimed.failed.is_empty());
        assert_eq!(repo.counts().await.unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn test_heartbeat_keeps_running_job_claimed() {
        let (pool, _dir) = setup_test_db().await;
        let repo = JobRepository::new(pool);
        let started = Utc::now() - Duration::minutes(10);

        repo.insert(&new_job("job-1", started)).await.unwrap();
        repo.claim_next(started).await.unwrap();
        assert!(repo.heartbeat("job-1", 1, Utc::now()).await.unwrap());

        let swept = repo
            .reclaim_stalled(Utc::now() - Duration::minutes(5), Utc::now())
            .await
            .unwrap();
        assert!(swept.is_empty());

        let job = repo.find_by_id("job-1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Active);
        assert_eq!(job.started_at.unwrap().timestamp_millis(), started.timestamp_millis());
    }

    #[tokio::test]
    async fn test_reclaimed_attempt_cannot_settle_job() {
        let (pool, _dir) = setup_test_db().await;
        let repo = JobRepository::new(pool);
        let started = Utc::now() - Duration::minutes(10);

        repo.insert(&new_job("job-1", started)).await.unwrap();
        repo.claim_next(started).await.unwrap();
        repo.reclaim_stalled(Utc::now() - Duration::minutes(5), Utc::now())
            .await
            .unwrap();
        let second = repo.claim_next(Utc::now()).await.unwrap().unwrap();
        assert_eq!(second.attempts_made, 2);

        assert!(!repo.heartbeat("job-1", 1, Utc::now()).await.unwrap());
        assert!(matches!(
            repo.update_progress("job-1", 1, 50).await,
            Err(DbError::ClaimLost { attempt: 1, .. })
        ));
        assert!(repo.complete("job-1", 1, Utc::now(), true).await.is_err());
        assert!(repo
            .schedule_retry("job-1", 1, "late", Utc::now())
            .await
            .is_err());
        assert!(repo
            .fail("job-1", 1, "late", Utc::now(), false)
            .await
            .is_err());

        let job = repo.find_by_id("job-1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Active);
        assert_eq!(job.attempts_made, 2);

        repo.complete("job-1", 2, Utc::now(), true).await.unwrap();
        assert!(repo.find_by_id("job-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stalled_job_without_attempts_left_fails() {
        let (pool, _dir) = setup_test_db().await;
        let repo = JobRepository::new(pool);
        let started = Utc::now() - Duration::minutes(10);

        let mut job = new_job("job-1", started);
        job.options = JobOptions::default().with_attempts(1);
        repo.insert(&job).await.unwrap();
        repo.claim_next(started).await.unwrap();

        let swept = repo
            .reclaim_stalled(Utc::now() - Duration::minutes(5), Utc::now())
            .await
            .unwrap();
        assert!(swept.requeued.is_empty());
        assert_eq!(
            swept.failed,
            vec![ExhaustedJob {
                id: "job-1".to_string(),
                attempts_made: 1,
            }]
        );

        let failed = repo.find_by_id("job-1").await.unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.attempts_made, 1);
        assert_eq!(failed.last_error.as_deref(), Some(STALLED_EXHAUSTED_ERROR));
        assert!(repo.claim_next(Utc::now()).await.unwrap().is_none());

        let again = repo
            .reclaim_stalled(Utc::now(), Utc::now())
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_job_removed_on_fail() {
        let (pool, _dir) = setup_test_db().await;
        let repo = JobRepository::new(pool);
        let started = Utc::now() - Duration::minutes(10);

        let mut job = new_job("job-1", started);
        job.options = JobOptions {
            remove_on_fail: true,
            ..JobOptions::default().with_attempts(1)
        };
        repo.insert(&job).await.unwrap();
        repo.claim_next(started).await.unwrap();

        let swept = repo
            .reclaim_stalled(Utc::now() - Duration::minutes(5), Utc::now())
            .await
            .unwrap();
        assert_eq!(
            swept.failed,
            vec![ExhaustedJob {
                id: "job-1".to_string(),
                attempts_made: 1,
            }]
        );
        assert!(repo.find_by_id("job-1").await.unwrap().is_none());
    }
}
