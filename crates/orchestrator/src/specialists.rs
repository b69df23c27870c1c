use std::sync::Arc;

use hyperflow_core::{AgentType, Subtask};
use llm::Generator;

use crate::error::Result;
use crate::prompts::{
    AgentPrompts, CODE_INSTRUCTION, DESIGN_INSTRUCTION, RESEARCH_INSTRUCTION,
};
use crate::run_state::RunState;

pub const NO_RESEARCH: &str = "No research";
pub const NO_DESIGN: &str = "No design";
pub const NO_INTEGRATION: &str = "No integration";

/// The specialist agents, dispatched by agent type.
#[derive(Clone)]
pub struct Specialists {
    generator: Arc<dyn Generator>,
}

impl Specialists {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Produces the output of `subtask` given what earlier subtasks produced.
    pub async fn run(&self, subtask: &Subtask, state: &RunState) -> Result<String> {
        let outputs = &state.specialist_outputs;

        let output = match subtask.agent_type {
            AgentType::Researcher => {
                let system = AgentPrompts::researcher(&subtask.name, &state.user_request);
                self.generator.generate(&system, RESEARCH_INSTRUCTION).await?
            }
            AgentType::Designer => {
                let research = outputs.get(AgentType::Researcher).unwrap_or(NO_RESEARCH);
                let system =
                    AgentPrompts::designer(&subtask.name, &state.user_request, research);
                self.generator.generate(&system, DESIGN_INSTRUCTION).await?
            }
            AgentType::Coder => {
                let design = outputs.get(AgentType::Designer).unwrap_or(NO_DESIGN);
                let integrated = state
                    .integrated_solution
                    .as_deref()
                    .unwrap_or(NO_INTEGRATION);
                let system = AgentPrompts::coder(&subtask.name, design, integrated);
                self.generator.generate(&system, CODE_INSTRUCTION).await?
            }
            AgentType::EssenceSeeker
            | AgentType::DevilsAdvocate
            | AgentType::Integrator
            | AgentType::Safety => format!("Agent {} not implemented yet", subtask.agent_type),
        };

        Ok(output)
    }
}
