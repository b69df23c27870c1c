//! Durable job queue on SQLite and the bounded worker pool that drains it.

mod error;
mod job_queue;
mod worker;

pub use error::{QueueError, QueueResult};
pub use job_queue::{FailureOutcome, JobQueue};
pub use worker::{JobContext, JobError, JobHandler, WorkerConfig, WorkerHandle, WorkerPool};
