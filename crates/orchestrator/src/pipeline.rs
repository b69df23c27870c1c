use async_trait::async_trait;
use db::WorkflowRepository;
use events::{Event, EventBus};
use hyperflow_core::{WorkflowId, WorkflowJobData, WorkflowStatus};
use queue::{JobContext, JobError, JobHandler};
use tracing::{error, info, warn};

use crate::dispatcher::SpecialistDispatcher;
use crate::error::{OrchestratorError, Result};
use crate::integration::IntegrationStage;
use crate::planner::PlanGenerator;
use crate::run_state::RunState;
use crate::safety::SafetyGate;
use crate::state_machine::{WorkflowEvent, WorkflowStateMachine};

#[derive(Debug)]
pub enum ExecutionOutcome {
    /// The workflow had already completed; nothing ran.
    AlreadyCompleted,
    Finished {
        status: WorkflowStatus,
        state: Box<RunState>,
    },
}

/// Plan, dispatch, integrate and review one workflow.
#[derive(Clone)]
pub struct WorkflowPipeline {
    workflows: WorkflowRepository,
    planner: PlanGenerator,
    dispatcher: SpecialistDispatcher,
    integration: IntegrationStage,
    safety: SafetyGate,
    events: EventBus,
}

impl WorkflowPipeline {
    pub fn new(
        workflows: WorkflowRepository,
        planner: PlanGenerator,
        dispatcher: SpecialistDispatcher,
        integration: IntegrationStage,
        safety: SafetyGate,
        events: EventBus,
    ) -> Self {
        Self {
            workflows,
            planner,
            dispatcher,
            integration,
            safety,
            events,
        }
    }

    /// Runs the workflow to `completed` or `failed`.
    ///
    /// Any stage error marks the workflow failed and is returned so the
    /// queue can schedule another attempt. A safety veto is a normal outcome.
    pub async fn execute(&self, workflow_id: WorkflowId, attempt: u32) -> Result<ExecutionOutcome> {
        let workflow = self
            .workflows
            .find_by_id(workflow_id)
            .await?
            .ok_or(OrchestratorError::WorkflowNotFound(workflow_id))?;

        if workflow.status == WorkflowStatus::Completed {
            info!(workflow_id = %workflow_id, "Workflow already completed, skipping");
            return Ok(ExecutionOutcome::AlreadyCompleted);
        }

        let event = WorkflowStateMachine::pickup_event(workflow.status);
        let processing = WorkflowStateMachine::transition(workflow.status, event)?;
        self.set_status(workflow_id, workflow.status, processing).await?;

        info!(workflow_id = %workflow_id, attempt, "Workflow started");
        let mut state = RunState::new(workflow.user_request, attempt);

        let finished = match self.run_stages(workflow_id, &mut state).await {
            Ok(()) => self.finish(workflow_id, &state).await,
            Err(e) => Err(e),
        };

        match finished {
            Ok(status) => {
                info!(
                    workflow_id = %workflow_id,
                    status = %status,
                    subtasks = state.completed_tasks.len(),
                    "Workflow finished"
                );
                Ok(ExecutionOutcome::Finished {
                    status,
                    state: Box::new(state),
                })
            }
            Err(e) => {
                error!(workflow_id = %workflow_id, attempt, error = %e, "Workflow failed");
                if let Err(status_err) = self
                    .set_status(workflow_id, WorkflowStatus::Processing, WorkflowStatus::Failed)
                    .await
                {
                    error!(
                        workflow_id = %workflow_id,
                        error = %status_err,
                        "Failed to mark workflow failed"
                    );
                }
                Err(e)
            }
        }
    }

    /// Records the terminal status decided by the safety review.
    async fn finish(&self, workflow_id: WorkflowId, state: &RunState) -> Result<WorkflowStatus> {
        let status = WorkflowStateMachine::transition(
            WorkflowStatus::Processing,
            WorkflowEvent::Finish {
                approved: state.is_approved(),
            },
        )?;
        self.set_status(workflow_id, WorkflowStatus::Processing, status)
            .await?;
        Ok(status)
    }

    async fn run_stages(&self, workflow_id: WorkflowId, state: &mut RunState) -> Result<()> {
        let mut published = 0;

        let plan = self.planner.create_plan(&state.user_request).await?;
        state.plan = Some(plan);
        state.trace("Orchestrator: Plan created");
        published = self.publish_trace(workflow_id, state, published);

        self.dispatcher.dispatch_all(workflow_id, state).await?;
        published = self.publish_trace(workflow_id, state, published);

        self.integration.integrate(state).await?;
        published = self.publish_trace(workflow_id, state, published);

        self.safety.review(state).await?;
        self.publish_trace(workflow_id, state, published);

        Ok(())
    }

    fn publish_trace(&self, workflow_id: WorkflowId, state: &RunState, from: usize) -> usize {
        for line in &state.agent_trace[from..] {
            self.events.emit(Event::WorkflowTrace {
                workflow_id,
                line: line.clone(),
            });
        }
        state.agent_trace.len()
    }

    async fn set_status(
        &self,
        workflow_id: WorkflowId,
        from: WorkflowStatus,
        to: WorkflowStatus,
    ) -> Result<()> {
        WorkflowStateMachine::validate_transition(from, to)?;
        self.workflows.update_status(workflow_id, to).await?;
        self.events.emit(Event::WorkflowStatusChanged {
            workflow_id,
            from_status: from,
            to_status: to,
        });
        Ok(())
    }
}

/// Queue handler for `process-workflow` jobs.
#[derive(Clone)]
pub struct WorkflowJobHandler {
    pipeline: WorkflowPipeline,
}

impl WorkflowJobHandler {
    pub fn new(pipeline: WorkflowPipeline) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl JobHandler for WorkflowJobHandler {
    async fn handle(&self, ctx: &JobContext) -> std::result::Result<(), JobError> {
        let data: WorkflowJobData = ctx.payload()?;

        match self.pipeline.execute(data.workflow_id, ctx.attempt()).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_retryable() => Err(JobError::retryable(e.to_string())),
            Err(e) => {
                warn!(job_id = %ctx.id(), workflow_id = %data.workflow_id, error = %e, "Job cannot succeed");
                Err(JobError::permanent(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        test_engine, test_engine_with_options, ScriptedGenerator, CODER_MARKER,
        INTEGRATOR_MARKER, SAFETY_MARKER,
    };
    use hyperflow_core::{AgentType, Backoff, JobOptions, JobState, Subtask, TaskPlan};
    use std::time::{Duration, Instant};
    use llm::OfflineGenerator;
    use std::sync::Arc;

    fn finished(outcome: ExecutionOutcome) -> (WorkflowStatus, RunState) {
        match outcome {
            ExecutionOutcome::Finished { status, state } => (status, *state),
            ExecutionOutcome::AlreadyCompleted => panic!("workflow did not run"),
        }
    }

    #[tokio::test]
    async fn test_offline_rocket_completes_with_fallback_plan() {
        let (ctx, _dir) = test_engine(Arc::new(OfflineGenerator)).await;
        let workflow = ctx.workflows().create("Build a rocket").await.unwrap();

        let (status, state) = finished(ctx.pipeline().execute(workflow.id, 1).await.unwrap());

        assert_eq!(status, WorkflowStatus::Completed);
        let plan = state.plan.as_ref().unwrap();
        assert_eq!(plan.subtasks.len(), 2);
        assert_eq!(plan.subtasks[0].agent_type, AgentType::Researcher);
        assert_eq!(plan.subtasks[1].agent_type, AgentType::Designer);
        assert_eq!(state.completed_tasks.len(), 2);
        assert!(state
            .agent_trace
            .contains(&"Orchestrator: Plan created".to_string()));
        assert_eq!(state.safety_approval, Some(true));

        let stored = ctx.workflows().find_by_id(workflow.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkflowStatus::Completed);
        assert_eq!(ctx.tasks().find_by_workflow(workflow.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_vetoed_code_fails_workflow_after_all_subtasks() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .with_plan(TaskPlan {
                    subtasks: vec![
                        Subtask::new(1, "Research", AgentType::Researcher),
                        Subtask::new(2, "Design", AgentType::Designer),
                        Subtask::new(3, "Code", AgentType::Coder),
                    ],
                    success_criteria: "Flies".to_string(),
                })
                .with_reply(CODER_MARKER, "localStorage.clear()")
                .with_reply(SAFETY_MARKER, "Decision: VETO\nRisk Level: High"),
        );
        let (ctx, _dir) = test_engine(generator).await;
        let workflow = ctx.workflows().create("Build a rocket").await.unwrap();

        let (status, state) = finished(ctx.pipeline().execute(workflow.id, 1).await.unwrap());

        assert_eq!(status, WorkflowStatus::Failed);
        assert_eq!(state.completed_tasks, vec![1, 2, 3]);
        assert_eq!(state.safety_approval, Some(false));
        assert_eq!(state.agent_trace.last().map(String::as_str), Some("Safety: Vetoed"));

        let stored = ctx.workflows().find_by_id(workflow.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_trace_order_and_events() {
        let (ctx, _dir) = test_engine(Arc::new(OfflineGenerator)).await;
        let mut rx = ctx.events().subscribe();
        let workflow = ctx.workflows().create("Build a rocket").await.unwrap();

        let (_, state) = finished(ctx.pipeline().execute(workflow.id, 1).await.unwrap());
        assert_eq!(
            state.agent_trace,
            vec![
                "Orchestrator: Plan created",
                "researcher: Completed Research the request",
                "designer: Completed Design the solution",
                "Integrator: Synthesis complete",
            ]
        );

        let mut statuses = Vec::new();
        let mut traces = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            match envelope.event {
                Event::WorkflowStatusChanged { to_status, .. } => statuses.push(to_status),
                Event::WorkflowTrace { line, .. } => traces.push(line),
                _ => {}
            }
        }
        assert_eq!(
            statuses,
            vec![WorkflowStatus::Processing, WorkflowStatus::Completed]
        );
        assert_eq!(traces, state.agent_trace);
    }

    #[tokio::test]
    async fn test_stage_error_marks_failed_and_propagates() {
        let generator = Arc::new(ScriptedGenerator::new().failing_on(INTEGRATOR_MARKER));
        let (ctx, _dir) = test_engine(generator).await;
        let workflow = ctx.workflows().create("Build a rocket").await.unwrap();

        let err = ctx.pipeline().execute(workflow.id, 1).await.unwrap_err();
        assert!(err.is_retryable());

        let stored = ctx.workflows().find_by_id(workflow.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_retry_after_failure_can_complete() {
        let (ctx, _dir) = test_engine(Arc::new(OfflineGenerator)).await;
        let workflow = ctx.workflows().create("Build a rocket").await.unwrap();
        ctx.workflows()
            .update_status(workflow.id, WorkflowStatus::Failed)
            .await
            .unwrap();

        let (status, state) = finished(ctx.pipeline().execute(workflow.id, 2).await.unwrap());
        assert_eq!(status, WorkflowStatus::Completed);
        assert_eq!(state.retry_count, 2);
    }

    #[tokio::test]
    async fn test_completed_workflow_is_skipped() {
        let (ctx, _dir) = test_engine(Arc::new(OfflineGenerator)).await;
        let workflow = ctx.workflows().create("Build a rocket").await.unwrap();
        ctx.workflows()
            .update_status(workflow.id, WorkflowStatus::Completed)
            .await
            .unwrap();

        let outcome = ctx.pipeline().execute(workflow.id, 1).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::AlreadyCompleted));
        assert!(ctx.tasks().find_by_workflow(workflow.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_not_retryable() {
        let (ctx, _dir) = test_engine(Arc::new(OfflineGenerator)).await;
        let err = ctx.pipeline().execute(404, 1).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::WorkflowNotFound(404)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_worker_pool_drives_submitted_workflow_to_completion() {
        let (ctx, _dir) = test_engine(Arc::new(OfflineGenerator)).await;
        let submitted = ctx
            .service()
            .submit(&hyperflow_core::CreateWorkflowRequest::new("Build a rocket"))
            .await
            .unwrap();

        let workers = ctx
            .worker_pool(fast_workers())
            .start();

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let status = ctx.service().get(submitted.workflow.id).await.unwrap().status;
            if status == WorkflowStatus::Completed {
                break;
            }
            assert!(Instant::now() < deadline, "workflow stuck in {status}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        workers.shutdown().await;

        assert!(ctx.queue().find(&submitted.job_id).await.unwrap().is_none());
    }

    fn fast_workers() -> queue::WorkerConfig {
        queue::WorkerConfig {
            concurrency: 2,
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_failed_status_write_still_marks_workflow_failed() {
        let (ctx, dir) = test_engine(Arc::new(OfflineGenerator)).await;
        let workflow = ctx.workflows().create("Build a rocket").await.unwrap();

        let url = format!("sqlite:{}", dir.path().join("engine.db").display());
        let pool = db::create_pool(&url).await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_completed BEFORE UPDATE OF status ON workflows \
             WHEN NEW.status = 'completed' BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let err = ctx.pipeline().execute(workflow.id, 1).await.unwrap_err();
        assert!(err.is_retryable());

        let stored = ctx.workflows().find_by_id(workflow.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkflowStatus::Failed);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_integration_failure_retries_then_leaves_job_failed() {
        let generator = Arc::new(ScriptedGenerator::new().failing_on(INTEGRATOR_MARKER));
        let options = JobOptions::default()
            .with_attempts(2)
            .with_backoff(Backoff::fixed(10));
        let (ctx, _dir) = test_engine_with_options(generator.clone(), options).await;
        let mut rx = ctx.events().subscribe();

        let submitted = ctx
            .service()
            .submit(&hyperflow_core::CreateWorkflowRequest::new("Build a rocket"))
            .await
            .unwrap();
        let workers = ctx.worker_pool(fast_workers()).start();

        let deadline = Instant::now() + Duration::from_secs(10);
        let job = loop {
            if let Some(job) = ctx.queue().find(&submitted.job_id).await.unwrap() {
                if job.state == JobState::Failed {
                    break job;
                }
            }
            assert!(Instant::now() < deadline, "job never failed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        workers.shutdown().await;

        assert_eq!(generator.prompts_containing(INTEGRATOR_MARKER).len(), 2);
        assert_eq!(job.attempts_made, 2);
        assert!(job.last_error.is_some());

        let stored = ctx.service().get(submitted.workflow.id).await.unwrap();
        assert_eq!(stored.status, WorkflowStatus::Failed);

        let mut pickups = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            if let Event::WorkflowStatusChanged {
                from_status,
                to_status: WorkflowStatus::Processing,
                ..
            } = envelope.event
            {
                pickups.push(from_status);
            }
        }
        assert_eq!(
            pickups,
            vec![WorkflowStatus::Queued, WorkflowStatus::Failed]
        );
    }
}
