use serde::{Deserialize, Serialize};

use super::plan::AgentType;
use super::workflow::WorkflowId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Audit row written once per subtask before it executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub workflow_id: WorkflowId,
    pub agent_type: AgentType,
    pub name: String,
    pub input: Option<String>,
    pub output: Option<String>,
    pub status: TaskStatus,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub workflow_id: WorkflowId,
    pub agent_type: AgentType,
    pub name: String,
    pub input: Option<String>,
}

impl NewTask {
    pub fn pending(workflow_id: WorkflowId, agent_type: AgentType, name: impl Into<String>) -> Self {
        Self {
            workflow_id,
            agent_type,
            name: name.into(),
            input: None,
        }
    }
}
