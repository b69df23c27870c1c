pub mod context;
pub mod dispatcher;
pub mod error;
pub mod integration;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod run_state;
pub mod safety;
pub mod service;
pub mod specialists;
pub mod state_machine;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{EngineConfig, EngineContext};
pub use dispatcher::SpecialistDispatcher;
pub use error::{OrchestratorError, Result};
pub use integration::IntegrationStage;
pub use pipeline::{ExecutionOutcome, WorkflowJobHandler, WorkflowPipeline};
pub use planner::PlanGenerator;
pub use run_state::{RunState, SpecialistOutputs};
pub use safety::SafetyGate;
pub use service::{RequeuedWorkflow, SubmittedWorkflow, WorkflowService};
pub use specialists::Specialists;
pub use state_machine::{WorkflowEvent, WorkflowStateMachine};
