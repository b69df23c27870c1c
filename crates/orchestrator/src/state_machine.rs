use hyperflow_core::WorkflowStatus;

use crate::error::{OrchestratorError, Result};

/// Things that move a workflow between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEvent {
    /// A worker picked up the first job for a queued workflow.
    Start,
    /// The queue dispatched another attempt after a failure or a stall.
    Retry,
    Finish { approved: bool },
    Fail,
    /// External recovery puts the workflow back in the queue.
    Reset,
}

pub struct WorkflowStateMachine;

impl WorkflowStateMachine {
    pub fn transition(from: WorkflowStatus, event: WorkflowEvent) -> Result<WorkflowStatus> {
        let to = match (from, event) {
            (WorkflowStatus::Queued, WorkflowEvent::Start) => WorkflowStatus::Processing,
            (WorkflowStatus::Failed | WorkflowStatus::Processing, WorkflowEvent::Retry) => {
                WorkflowStatus::Processing
            }
            (WorkflowStatus::Processing, WorkflowEvent::Finish { approved: true }) => {
                WorkflowStatus::Completed
            }
            (WorkflowStatus::Processing, WorkflowEvent::Finish { approved: false })
            | (WorkflowStatus::Processing, WorkflowEvent::Fail) => WorkflowStatus::Failed,
            (
                WorkflowStatus::Queued | WorkflowStatus::Processing | WorkflowStatus::Failed,
                WorkflowEvent::Reset,
            ) => WorkflowStatus::Queued,
            (from, event) => {
                return Err(OrchestratorError::InvalidTransition {
                    from: from.as_str().to_string(),
                    to: format!("{:?}", event),
                })
            }
        };
        Ok(to)
    }

    pub fn validate_transition(from: WorkflowStatus, to: WorkflowStatus) -> Result<()> {
        if Self::allowed_transitions(from).contains(&to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: WorkflowStatus) -> Vec<WorkflowStatus> {
        match from {
            WorkflowStatus::Queued => vec![WorkflowStatus::Processing, WorkflowStatus::Queued],
            WorkflowStatus::Processing => vec![
                WorkflowStatus::Completed,
                WorkflowStatus::Failed,
                WorkflowStatus::Processing,
                WorkflowStatus::Queued,
            ],
            WorkflowStatus::Failed => vec![WorkflowStatus::Processing, WorkflowStatus::Queued],
            WorkflowStatus::Completed => vec![],
        }
    }

    pub fn can_transition(from: WorkflowStatus, to: WorkflowStatus) -> bool {
        Self::validate_transition(from, to).is_ok()
    }

    /// The event a worker applies when it picks up a job for a workflow in `status`.
    pub fn pickup_event(status: WorkflowStatus) -> WorkflowEvent {
        match status {
            WorkflowStatus::Queued => WorkflowEvent::Start,
            _ => WorkflowEvent::Retry,
        }
    }
}
