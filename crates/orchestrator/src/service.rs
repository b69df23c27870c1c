use db::WorkflowRepository;
use events::{Event, EventBus};
use hyperflow_core::{CreateWorkflowRequest, Workflow, WorkflowId, WorkflowStatus};
use queue::JobQueue;
use tracing::{error, info};

use crate::error::{OrchestratorError, Result};
use crate::state_machine::{WorkflowEvent, WorkflowStateMachine};

#[derive(Debug, Clone)]
pub struct SubmittedWorkflow {
    pub workflow: Workflow,
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequeuedWorkflow {
    pub workflow_id: WorkflowId,
    pub previous_status: WorkflowStatus,
    pub job_id: String,
}

/// Producer side: records workflows and hands them to the queue.
#[derive(Clone)]
pub struct WorkflowService {
    workflows: WorkflowRepository,
    queue: JobQueue,
    events: EventBus,
}

impl WorkflowService {
    pub fn new(workflows: WorkflowRepository, queue: JobQueue, events: EventBus) -> Self {
        Self {
            workflows,
            queue,
            events,
        }
    }

    /// Validates and persists the request as `queued`, then enqueues a job for it.
    ///
    /// `options` are accepted and currently have no effect on execution.
    pub async fn submit(&self, request: &CreateWorkflowRequest) -> Result<SubmittedWorkflow> {
        request.validate()?;

        let workflow = self.workflows.create(&request.user_request).await?;
        self.events.emit(Event::WorkflowCreated {
            workflow_id: workflow.id,
        });

        let job_id = match self.queue.enqueue_workflow(workflow.id).await {
            Ok(job_id) => job_id,
            Err(e) => {
                error!(
                    workflow_id = %workflow.id,
                    error = %e,
                    "Enqueue failed, workflow left queued for requeue"
                );
                return Err(e.into());
            }
        };

        info!(workflow_id = %workflow.id, job_id = %job_id, "Workflow submitted");
        Ok(SubmittedWorkflow { workflow, job_id })
    }

    pub async fn get(&self, id: WorkflowId) -> Result<Workflow> {
        self.workflows
            .find_by_id(id)
            .await?
            .ok_or(OrchestratorError::WorkflowNotFound(id))
    }

    /// Resets stuck workflows to `queued` and enqueues a fresh job for each.
    ///
    /// Queued and processing workflows are always picked up. Failed ones only
    /// when `include_failed` is set.
    pub async fn requeue_stuck(&self, include_failed: bool) -> Result<Vec<RequeuedWorkflow>> {
        let mut statuses = vec![WorkflowStatus::Queued, WorkflowStatus::Processing];
        if include_failed {
            statuses.push(WorkflowStatus::Failed);
        }

        let stuck = self.workflows.find_by_statuses(&statuses).await?;
        let mut requeued = Vec::with_capacity(stuck.len());

        for workflow in stuck {
            let status = WorkflowStateMachine::transition(workflow.status, WorkflowEvent::Reset)?;
            if status != workflow.status {
                self.workflows.update_status(workflow.id, status).await?;
                self.events.emit(Event::WorkflowStatusChanged {
                    workflow_id: workflow.id,
                    from_status: workflow.status,
                    to_status: status,
                });
            }

            let job_id = self.queue.enqueue_workflow(workflow.id).await?;
            info!(
                workflow_id = %workflow.id,
                previous_status = %workflow.status,
                job_id = %job_id,
                "Workflow requeued"
            );
            requeued.push(RequeuedWorkflow {
                workflow_id: workflow.id,
                previous_status: workflow.status,
                job_id,
            });
        }

        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_engine;
    use hyperflow_core::{CoreError, WorkflowOptions};
    use llm::OfflineGenerator;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_submit_creates_queued_workflow_and_job() {
        let (ctx, _dir) = test_engine(Arc::new(OfflineGenerator)).await;
        let service = ctx.service();

        let submitted = service
            .submit(&CreateWorkflowRequest::new("Build a rocket"))
            .await
            .unwrap();

        assert!(submitted.workflow.id > 0);
        assert_eq!(submitted.workflow.status, WorkflowStatus::Queued);
        assert!(submitted
            .job_id
            .starts_with(&format!("workflow-{}-", submitted.workflow.id)));

        let job = ctx.queue().find(&submitted.job_id).await.unwrap().unwrap();
        assert_eq!(job.options.attempts, 3);
        assert_eq!(job.options.backoff.delay_ms, 2000);
    }

    #[tokio::test]
    async fn test_submit_rejects_blank_request() {
        let (ctx, _dir) = test_engine(Arc::new(OfflineGenerator)).await;

        let err = ctx
            .service()
            .submit(&CreateWorkflowRequest::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Invalid(CoreError::Validation(_))));
        assert_eq!(ctx.queue().counts().await.unwrap().waiting, 0);
    }

    #[tokio::test]
    async fn test_options_are_accepted() {
        let (ctx, _dir) = test_engine(Arc::new(OfflineGenerator)).await;
        let mut request = CreateWorkflowRequest::new("Build a rocket");
        request.options = Some(WorkflowOptions {
            timeout: Some(30_000),
            retry_limit: Some(1),
        });

        let submitted = ctx.service().submit(&request).await.unwrap();
        let job = ctx.queue().find(&submitted.job_id).await.unwrap().unwrap();
        assert_eq!(job.options.attempts, 3);
    }

    #[tokio::test]
    async fn test_get_unknown_workflow() {
        let (ctx, _dir) = test_engine(Arc::new(OfflineGenerator)).await;
        let err = ctx.service().get(999).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::WorkflowNotFound(999)));
    }

    #[tokio::test]
    async fn test_requeue_resets_stuck_workflows() {
        let (ctx, _dir) = test_engine(Arc::new(OfflineGenerator)).await;
        let workflows = ctx.workflows();

        let queued = workflows.create("queued").await.unwrap();
        let processing = workflows.create("processing").await.unwrap();
        let failed = workflows.create("failed").await.unwrap();
        let done = workflows.create("done").await.unwrap();
        workflows
            .update_status(processing.id, WorkflowStatus::Processing)
            .await
            .unwrap();
        workflows
            .update_status(failed.id, WorkflowStatus::Failed)
            .await
            .unwrap();
        workflows
            .update_status(done.id, WorkflowStatus::Completed)
            .await
            .unwrap();

        let requeued = ctx.service().requeue_stuck(false).await.unwrap();
        let ids: Vec<_> = requeued.iter().map(|r| r.workflow_id).collect();
        assert_eq!(ids, vec![queued.id, processing.id]);
        assert_eq!(requeued[1].previous_status, WorkflowStatus::Processing);

        let reset = workflows.find_by_id(processing.id).await.unwrap().unwrap();
        assert_eq!(reset.status, WorkflowStatus::Queued);
        assert_eq!(ctx.queue().counts().await.unwrap().waiting, 2);

        let with_failed = ctx.service().requeue_stuck(true).await.unwrap();
        assert!(with_failed.iter().any(|r| r.workflow_id == failed.id));
        assert!(with_failed.iter().all(|r| r.workflow_id != done.id));
    }
}
