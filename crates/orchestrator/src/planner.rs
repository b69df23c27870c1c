use std::sync::Arc;

use hyperflow_core::{AgentType, Subtask, TaskPlan};
use llm::{generate_structured, Generator};
use tracing::{info, warn};

use crate::error::{OrchestratorError, Result};
use crate::prompts::{AgentPrompts, PLAN_INSTRUCTION};

const MIN_SUBTASKS: usize = 3;
const MAX_SUBTASKS: usize = 7;
const PLAN_SCHEMA_NAME: &str = "task_plan";

/// Turns a user request into an ordered [`TaskPlan`].
#[derive(Clone)]
pub struct PlanGenerator {
    generator: Arc<dyn Generator>,
}

impl PlanGenerator {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Deterministic plan used when no generation backend is configured.
    pub fn fallback_plan() -> TaskPlan {
        TaskPlan {
            subtasks: vec![
                Subtask::new(1, "Research the request", AgentType::Researcher).with_parallel(true),
                Subtask::new(2, "Design the solution", AgentType::Designer),
            ],
            success_criteria: "Fallback plan executed".to_string(),
        }
    }

    pub async fn create_plan(&self, user_request: &str) -> Result<TaskPlan> {
        let system = AgentPrompts::orchestrator(user_request);

        let plan = match generate_structured::<TaskPlan>(
            self.generator.as_ref(),
            &system,
            PLAN_INSTRUCTION,
            PLAN_SCHEMA_NAME,
        )
        .await
        {
            Ok(plan) => plan,
            Err(e) if e.is_unavailable() => {
                warn!(error = %e, "Generation unavailable, using fallback plan");
                return Ok(Self::fallback_plan());
            }
            Err(e) => return Err(e.into()),
        };

        if plan.subtasks.is_empty() {
            return Err(OrchestratorError::GenerationFailed(
                "plan contains no subtasks".to_string(),
            ));
        }

        let count = plan.subtasks.len();
        if !(MIN_SUBTASKS..=MAX_SUBTASKS).contains(&count) {
            warn!(
                subtasks = count,
                "Plan size outside the requested {}-{} range", MIN_SUBTASKS, MAX_SUBTASKS
            );
        }

        info!(subtasks = count, "Plan created");
        Ok(plan)
    }
}
