use hyperflow_core::{Backoff, BackoffKind, Job, JobOptions, JobState};

use super::millis_to_datetime;
use crate::error::DbError;

pub(crate) const JOB_COLUMNS: &str = "id, name, payload, state, attempts, attempts_made, \
    backoff_kind, backoff_delay_ms, remove_on_complete, remove_on_fail, progress, run_at, \
    last_error, created_at, started_at, finished_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: String,
    pub name: String,
    pub payload: String,
    pub state: String,
    pub attempts: i64,
    pub attempts_made: i64,
    pub backoff_kind: String,
    pub backoff_delay_ms: i64,
    pub remove_on_complete: bool,
    pub remove_on_fail: bool,
    pub progress: i64,
    pub run_at: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl JobRow {
    pub fn into_domain(self) -> Result<Job, DbError> {
        let state = JobState::parse(&self.state)
            .ok_or_else(|| DbError::invalid_row("jobs", format!("unknown state {}", self.state)))?;
        let kind = BackoffKind::parse(&self.backoff_kind).ok_or_else(|| {
            DbError::invalid_row("jobs", format!("unknown backoff {}", self.backoff_kind))
        })?;

        Ok(Job {
            payload: serde_json::from_str(&self.payload)?,
            id: self.id,
            name: self.name,
            state,
            options: JobOptions {
                attempts: self.attempts.max(0) as u32,
                backoff: Backoff {
                    kind,
                    delay_ms: self.backoff_delay_ms.max(0) as u64,
                },
                remove_on_complete: self.remove_on_complete,
                remove_on_fail: self.remove_on_fail,
            },
            attempts_made: self.attempts_made.max(0) as u32,
            progress: self.progress.clamp(0, 100) as u8,
            run_at: millis_to_datetime(self.run_at),
            last_error: self.last_error,
            created_at: millis_to_datetime(self.created_at),
            started_at: self.started_at.map(millis_to_datetime),
            finished_at: self.finished_at.map(millis_to_datetime),
        })
    }
}
