use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use db::{JobRepository, STALLED_EXHAUSTED_ERROR};
use events::{Event, EventBus};
use hyperflow_core::{
    Job, JobCounts, JobOptions, NewJob, StalledJobs, WorkflowId, WorkflowJobData,
    PROCESS_WORKFLOW_JOB,
};
use sqlx::SqlitePool;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::QueueResult;

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retrying { run_at: DateTime<Utc> },
    Terminal,
}

/// Producer and bookkeeping side of the durable queue.
///
/// Cloning is cheap; clones share the pool and the wake-up signal.
#[derive(Clone)]
pub struct JobQueue {
    jobs: JobRepository,
    options: JobOptions,
    events: EventBus,
    wakeup: Arc<Notify>,
}

impl JobQueue {
    pub fn new(pool: SqlitePool, options: JobOptions, events: EventBus) -> Self {
        Self {
            jobs: JobRepository::new(pool),
            options,
            events,
            wakeup: Arc::new(Notify::new()),
        }
    }

    pub fn options(&self) -> JobOptions {
        self.options
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// `workflow-{id}-{unix_ms}`
    pub fn job_id_for(workflow_id: WorkflowId, at: DateTime<Utc>) -> String {
        format!("workflow-{}-{}", workflow_id, at.timestamp_millis())
    }

    /// Enqueues a `process-workflow` job and returns its id.
    ///
    /// A job with the same id already present is left untouched.
    pub async fn enqueue_workflow(&self, workflow_id: WorkflowId) -> QueueResult<String> {
        let now = Utc::now();
        let job = NewJob {
            id: Self::job_id_for(workflow_id, now),
            name: PROCESS_WORKFLOW_JOB.to_string(),
            payload: serde_json::to_value(WorkflowJobData { workflow_id })?,
            options: self.options,
            created_at: now,
        };

        if self.jobs.insert(&job).await? {
            info!(
                job_id = %job.id,
                workflow_id = %workflow_id,
                attempts = job.options.attempts,
                "Job enqueued"
            );
            self.events.emit(Event::JobEnqueued {
                job_id: job.id.clone(),
            });
            self.wakeup.notify_one();
        } else {
            debug!(job_id = %job.id, "Duplicate job id, enqueue ignored");
        }

        Ok(job.id)
    }

    pub(crate) async fn claim(&self) -> QueueResult<Option<Job>> {
        Ok(self.jobs.claim_next(Utc::now()).await?)
    }

    pub(crate) async fn wait_for_work(&self) {
        self.wakeup.notified().await
    }

    pub(crate) async fn set_progress(&self, job: &Job, progress: u8) -> QueueResult<()> {
        self.jobs
            .update_progress(&job.id, job.attempts_made, progress)
            .await?;
        self.events.emit(Event::JobProgress {
            job_id: job.id.clone(),
            progress,
        });
        Ok(())
    }

    /// Renews the claim of a running attempt. `false` means it was lost.
    pub(crate) async fn heartbeat(&self, job: &Job) -> QueueResult<bool> {
        Ok(self
            .jobs
            .heartbeat(&job.id, job.attempts_made, Utc::now())
            .await?)
    }

    pub(crate) async fn complete(&self, job: &Job) -> QueueResult<()> {
        self.jobs
            .complete(
                &job.id,
                job.attempts_made,
                Utc::now(),
                job.options.remove_on_complete,
            )
            .await?;
        info!(job_id = %job.id, attempt = job.attempts_made, "Job completed");
        self.events.emit(Event::JobCompleted {
            job_id: job.id.clone(),
            attempts_made: job.attempts_made,
        });
        Ok(())
    }

    /// Schedules another attempt with backoff, or records a terminal failure
    /// when attempts are exhausted or `retryable` is false.
    pub(crate) async fn fail(
        &self,
        job: &Job,
        error: &str,
        retryable: bool,
    ) -> QueueResult<FailureOutcome> {
        let now = Utc::now();
        let outcome = if retryable && job.attempts_remaining() > 0 {
            let delay = job.options.backoff.delay_after(job.attempts_made);
            let run_at = now + chrono::Duration::milliseconds(delay.as_millis() as i64);
            self.jobs
                .schedule_retry(&job.id, job.attempts_made, error, run_at)
                .await?;
            warn!(
                job_id = %job.id,
                attempt = job.attempts_made,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Job failed, retry scheduled"
            );
            FailureOutcome::Retrying { run_at }
        } else {
            self.jobs
                .fail(
                    &job.id,
                    job.attempts_made,
                    error,
                    now,
                    job.options.remove_on_fail,
                )
                .await?;
            warn!(
                job_id = %job.id,
                attempt = job.attempts_made,
                error = %error,
                "Job failed permanently"
            );
            FailureOutcome::Terminal
        };

        self.events.emit(Event::JobFailed {
            job_id: job.id.clone(),
            attempts_made: job.attempts_made,
            error: error.to_string(),
            will_retry: matches!(outcome, FailureOutcome::Retrying { .. }),
        });

        Ok(outcome)
    }

    /// Handles active jobs without a heartbeat for `stall_timeout`.
    ///
    /// Jobs with attempts left return to waiting. The rest fail terminally.
    pub async fn reclaim_stalled(&self, stall_timeout: Duration) -> QueueResult<StalledJobs> {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::milliseconds(stall_timeout.as_millis() as i64);
        let stalled = self.jobs.reclaim_stalled(cutoff, now).await?;

        for job_id in &stalled.requeued {
            warn!(job_id = %job_id, "Stalled job returned to waiting");
            self.events.emit(Event::JobStalled {
                job_id: job_id.clone(),
            });
        }
        for job in &stalled.failed {
            warn!(
                job_id = %job.id,
                attempts = job.attempts_made,
                "Stalled job has no attempts left"
            );
            self.events.emit(Event::JobStalled {
                job_id: job.id.clone(),
            });
            self.events.emit(Event::JobFailed {
                job_id: job.id.clone(),
                attempts_made: job.attempts_made,
                error: STALLED_EXHAUSTED_ERROR.to_string(),
                will_retry: false,
            });
        }
        if !stalled.requeued.is_empty() {
            self.wakeup.notify_one();
        }
        Ok(stalled)
    }

    pub async fn counts(&self) -> QueueResult<JobCounts> {
        Ok(self.jobs.counts().await?)
    }

    pub async fn find(&self, job_id: &str) -> QueueResult<Option<Job>> {
        Ok(self.jobs.find_by_id(job_id).await?)
    }

    pub async fn ping(&self) -> QueueResult<()> {
        db::ping(self.jobs.pool()).await?;
        Ok(())
    }
}
