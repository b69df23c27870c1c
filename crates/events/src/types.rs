use chrono::{DateTime, Utc};
use hyperflow_core::{WorkflowId, WorkflowStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "workflow.created")]
    WorkflowCreated { workflow_id: WorkflowId },

    #[serde(rename = "workflow.status_changed")]
    WorkflowStatusChanged {
        workflow_id: WorkflowId,
        from_status: WorkflowStatus,
        to_status: WorkflowStatus,
    },

    /// A trace line produced while a workflow runs
    #[serde(rename = "workflow.trace")]
    WorkflowTrace { workflow_id: WorkflowId, line: String },

    #[serde(rename = "job.enqueued")]
    JobEnqueued { job_id: String },

    #[serde(rename = "job.progress")]
    JobProgress { job_id: String, progress: u8 },

    #[serde(rename = "job.completed")]
    JobCompleted { job_id: String, attempts_made: u32 },

    /// `will_retry` is false once attempts are exhausted or the error is permanent
    #[serde(rename = "job.failed")]
    JobFailed {
        job_id: String,
        attempts_made: u32,
        error: String,
        will_retry: bool,
    },

    #[serde(rename = "job.stalled")]
    JobStalled { job_id: String },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkflowCreated { .. } => "workflow.created",
            Self::WorkflowStatusChanged { .. } => "workflow.status_changed",
            Self::WorkflowTrace { .. } => "workflow.trace",
            Self::JobEnqueued { .. } => "job.enqueued",
            Self::JobProgress { .. } => "job.progress",
            Self::JobCompleted { .. } => "job.completed",
            Self::JobFailed { .. } => "job.failed",
            Self::JobStalled { .. } => "job.stalled",
        }
    }
}
