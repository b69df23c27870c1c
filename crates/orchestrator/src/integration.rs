use std::sync::Arc;

use llm::Generator;
use tracing::info;

use crate::error::Result;
use crate::prompts::{AgentPrompts, INTEGRATE_INSTRUCTION};
use crate::run_state::{RunState, SpecialistOutputs};

/// Merges every specialist output into one solution.
#[derive(Clone)]
pub struct IntegrationStage {
    generator: Arc<dyn Generator>,
}

impl IntegrationStage {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// `**AGENT:**\n{output}` blocks separated by a blank line.
    pub fn render_outputs(outputs: &SpecialistOutputs) -> String {
        outputs
            .iter()
            .map(|(agent, output)| format!("**{}:**\n{}", agent.as_str().to_uppercase(), output))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub async fn integrate(&self, state: &mut RunState) -> Result<()> {
        let rendered = Self::render_outputs(&state.specialist_outputs);
        let system = AgentPrompts::integrator(&rendered);

        let solution = self.generator.generate(&system, INTEGRATE_INSTRUCTION).await?;
        info!(chars = solution.len(), "Integration complete");

        state.integrated_solution = Some(solution);
        state.trace("Integrator: Synthesis complete");
        Ok(())
    }
}
