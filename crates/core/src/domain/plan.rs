use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The closed set of specialist agent types a plan may assign.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Researcher,
    Designer,
    Coder,
    EssenceSeeker,
    DevilsAdvocate,
    Integrator,
    Safety,
}

impl AgentType {
    pub const ALL: [AgentType; 7] = [
        Self::Researcher,
        Self::Designer,
        Self::Coder,
        Self::EssenceSeeker,
        Self::DevilsAdvocate,
        Self::Integrator,
        Self::Safety,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Researcher => "researcher",
            Self::Designer => "designer",
            Self::Coder => "coder",
            Self::EssenceSeeker => "essence_seeker",
            Self::DevilsAdvocate => "devils_advocate",
            Self::Integrator => "integrator",
            Self::Safety => "safety",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|agent| agent.as_str() == s)
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownAgentType(s.to_string()))
    }
}

/// One unit of planned work, assigned to exactly one agent type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct Subtask {
    pub id: u32,
    pub name: String,
    #[serde(rename = "agent")]
    pub agent_type: AgentType,
    /// Accepted from planners but not acted on: subtasks always run in order.
    #[serde(default)]
    pub parallel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<u32>>,
}

impl Subtask {
    pub fn new(id: u32, name: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            id,
            name: name.into(),
            agent_type,
            parallel: false,
            dependencies: None,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct TaskPlan {
    pub subtasks: Vec<Subtask>,
    pub success_criteria: String,
}

impl TaskPlan {
    pub fn contains_agent(&self, agent: AgentType) -> bool {
        self.subtasks.iter().any(|s| s.agent_type == agent)
    }
}
