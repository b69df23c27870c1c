use db::TaskRepository;
use hyperflow_core::{NewTask, WorkflowId};
use tracing::{debug, info};

use crate::error::{OrchestratorError, Result};
use crate::run_state::RunState;
use crate::specialists::Specialists;

/// Runs the plan's subtasks one after another, strictly in plan order.
#[derive(Clone)]
pub struct SpecialistDispatcher {
    tasks: TaskRepository,
    specialists: Specialists,
}

impl SpecialistDispatcher {
    pub fn new(tasks: TaskRepository, specialists: Specialists) -> Self {
        Self { tasks, specialists }
    }

    pub async fn dispatch_all(&self, workflow_id: WorkflowId, state: &mut RunState) -> Result<()> {
        let subtasks = state
            .plan
            .as_ref()
            .map(|plan| plan.subtasks.clone())
            .ok_or_else(|| OrchestratorError::GenerationFailed("no plan to dispatch".to_string()))?;

        for subtask in &subtasks {
            // `parallel` is advisory only.
            debug!(
                workflow_id = %workflow_id,
                subtask_id = subtask.id,
                agent = %subtask.agent_type,
                "Running subtask"
            );

            self.tasks
                .create_pending(&NewTask::pending(
                    workflow_id,
                    subtask.agent_type,
                    subtask.name.clone(),
                ))
                .await?;

            let output = self.specialists.run(subtask, state).await?;
            state.record_subtask(subtask, output);

            info!(
                workflow_id = %workflow_id,
                subtask_id = subtask.id,
                agent = %subtask.agent_type,
                "Subtask completed"
            );
        }

        Ok(())
    }
}
