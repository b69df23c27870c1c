use std::sync::Arc;

use hyperflow_core::AgentType;
use llm::Generator;
use tracing::{info, warn};

use crate::error::Result;
use crate::prompts::{AgentPrompts, REVIEW_INSTRUCTION};
use crate::run_state::RunState;

const APPROVAL_TOKEN: &str = "APPROVE";

/// Final approval gate over generated code.
#[derive(Clone)]
pub struct SafetyGate {
    generator: Arc<dyn Generator>,
}

impl SafetyGate {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Approves when there is no coder output. Otherwise the review must
    /// contain `APPROVE` (case-sensitive).
    pub async fn review(&self, state: &mut RunState) -> Result<bool> {
        let system = match state.specialist_outputs.get(AgentType::Coder) {
            Some(code) => AgentPrompts::safety(code),
            None => {
                state.safety_approval = Some(true);
                return Ok(true);
            }
        };

        let verdict = self.generator.generate(&system, REVIEW_INSTRUCTION).await?;
        let approved = verdict.contains(APPROVAL_TOKEN);

        if approved {
            info!("Safety review approved");
            state.trace("Safety: Approved");
        } else {
            warn!("Safety review vetoed the result");
            state.trace("Safety: Vetoed");
        }

        state.safety_approval = Some(approved);
        Ok(approved)
    }
}
