use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hyperflow_core::Job;
use serde::de::DeserializeOwned;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::QueueResult;
use crate::job_queue::JobQueue;

pub const DEFAULT_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub concurrency: usize,
    /// Upper bound on how long an idle worker waits before polling again.
    pub poll_interval: Duration,
    /// Active jobs whose heartbeat is older than this are reclaimed.
    pub stall_timeout: Duration,
    pub stall_check_interval: Duration,
    /// How often a running job renews its claim. Keep well below `stall_timeout`.
    pub heartbeat_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval: Duration::from_millis(500),
            stall_timeout: Duration::from_secs(300),
            stall_check_interval: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// Failure reported by a [`JobHandler`].
#[derive(Debug, Clone)]
pub struct JobError {
    pub message: String,
    pub retryable: bool,
}

impl JobError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// The job goes to the failed state without using its remaining attempts.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for JobError {}

/// The claimed job as seen by a handler.
pub struct JobContext {
    queue: JobQueue,
    job: Job,
}

impl JobContext {
    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn id(&self) -> &str {
        &self.job.id
    }

    /// 1-based attempt number of this execution.
    pub fn attempt(&self) -> u32 {
        self.job.attempts_made
    }

    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, JobError> {
        serde_json::from_value(self.job.payload.clone())
            .map_err(|e| JobError::permanent(format!("invalid payload: {}", e)))
    }

    pub async fn progress(&self, progress: u8) -> QueueResult<()> {
        self.queue.set_progress(&self.job, progress).await
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: &JobContext) -> Result<(), JobError>;
}

/// Runs up to `concurrency` jobs at a time from a [`JobQueue`].
pub struct WorkerPool {
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
}

/// Handle to a running pool. Dropping it stops the pool without waiting
/// for in-flight jobs.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stops claiming new jobs and waits for in-flight jobs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Worker pool task panicked");
        }
    }
}

impl WorkerPool {
    pub fn new(queue: JobQueue, handler: Arc<dyn JobHandler>, config: WorkerConfig) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    pub fn start(self) -> WorkerHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        WorkerHandle { shutdown, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let concurrency = self.config.concurrency.max(1);
        info!(concurrency, "Worker pool started");

        self.reclaim_stalled().await;
        let mut last_stall_check = Instant::now();

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            while let Some(result) = in_flight.try_join_next() {
                if let Err(e) = result {
                    error!(error = %e, "Job task panicked");
                }
            }

            if last_stall_check.elapsed() >= self.config.stall_check_interval {
                self.reclaim_stalled().await;
                last_stall_check = Instant::now();
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            match self.queue.claim().await {
                Ok(Some(job)) => {
                    let queue = self.queue.clone();
                    let handler = Arc::clone(&self.handler);
                    let heartbeat = self.config.heartbeat_interval;
                    in_flight.spawn(async move {
                        let _permit = permit;
                        process(queue, handler, job, heartbeat).await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = self.queue.wait_for_work() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "Failed to claim job");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        let remaining = in_flight.len();
        if remaining > 0 {
            info!(remaining, "Worker pool draining in-flight jobs");
        }
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Job task panicked");
            }
        }
        info!("Worker pool stopped");
    }

    async fn reclaim_stalled(&self) {
        if let Err(e) = self.queue.reclaim_stalled(self.config.stall_timeout).await {
            error!(error = %e, "Failed to reclaim stalled jobs");
        }
    }
}

async fn process(queue: JobQueue, handler: Arc<dyn JobHandler>, job: Job, heartbeat: Duration) {
    debug!(job_id = %job.id, name = %job.name, attempt = job.attempts_made, "Processing job");

    let ctx = JobContext {
        queue: queue.clone(),
        job,
    };

    if let Err(e) = ctx.progress(10).await {
        warn!(job_id = %ctx.id(), error = %e, "Failed to report progress");
    }

    let Some(result) = run_with_heartbeat(&queue, handler.as_ref(), &ctx, heartbeat).await else {
        return;
    };

    let bookkeeping = match result {
        Ok(()) => {
            if let Err(e) = ctx.progress(100).await {
                warn!(job_id = %ctx.id(), error = %e, "Failed to report progress");
            }
            queue.complete(&ctx.job).await
        }
        Err(err) => queue
            .fail(&ctx.job, &err.message, err.retryable)
            .await
            .map(|_| ()),
    };

    match bookkeeping {
        Ok(()) => {}
        Err(e) if e.is_claim_lost() => {
            warn!(job_id = %ctx.id(), attempt = ctx.attempt(), "Claim lost, outcome discarded");
        }
        Err(e) => error!(job_id = %ctx.id(), error = %e, "Failed to record job outcome"),
    }
}

/// Drives the handler while renewing the job's heartbeat.
///
/// Returns `None` when the claim was taken away mid-run; the handler is
/// dropped and another attempt owns the job.
async fn run_with_heartbeat(
    queue: &JobQueue,
    handler: &dyn JobHandler,
    ctx: &JobContext,
    heartbeat: Duration,
) -> Option<Result<(), JobError>> {
    let period = heartbeat.max(Duration::from_millis(1));
    let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let work = handler.handle(ctx);
    tokio::pin!(work);

    loop {
        tokio::select! {
            result = &mut work => return Some(result),
            _ = ticks.tick() => match queue.heartbeat(ctx.job()).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(job_id = %ctx.id(), attempt = ctx.attempt(), "Claim lost, abandoning job");
                    return None;
                }
                Err(e) => warn!(job_id = %ctx.id(), error = %e, "Failed to renew heartbeat"),
            },
        }
    }
}
