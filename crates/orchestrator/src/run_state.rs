use chrono::{DateTime, Utc};
use hyperflow_core::{AgentType, Subtask, TaskPlan};
use llm::ChatMessage;

/// Latest output per agent type, iterated in first-insertion order.
#[derive(Debug, Clone, Default)]
pub struct SpecialistOutputs {
    entries: Vec<(AgentType, String)>,
}

impl SpecialistOutputs {
    /// Replaces the previous output of `agent` in place, keeping its position.
    pub fn insert(&mut self, agent: AgentType, output: String) {
        match self.entries.iter_mut().find(|(a, _)| *a == agent) {
            Some(entry) => entry.1 = output,
            None => self.entries.push((agent, output)),
        }
    }

    pub fn get(&self, agent: AgentType) -> Option<&str> {
        self.entries
            .iter()
            .find(|(a, _)| *a == agent)
            .map(|(_, output)| output.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgentType, &str)> {
        self.entries.iter().map(|(a, o)| (*a, o.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Transient state of one pipeline execution.
#[derive(Debug, Clone)]
pub struct RunState {
    pub user_request: String,
    pub messages: Vec<ChatMessage>,
    pub plan: Option<TaskPlan>,
    pub completed_tasks: Vec<u32>,
    pub specialist_outputs: SpecialistOutputs,
    pub integrated_solution: Option<String>,
    pub safety_approval: Option<bool>,
    pub agent_trace: Vec<String>,
    /// Job attempt that produced this execution, starting at 1.
    pub retry_count: u32,
    pub started_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(user_request: impl Into<String>, attempt: u32) -> Self {
        let user_request = user_request.into();
        Self {
            messages: vec![ChatMessage::user(user_request.clone())],
            user_request,
            plan: None,
            completed_tasks: Vec::new(),
            specialist_outputs: SpecialistOutputs::default(),
            integrated_solution: None,
            safety_approval: None,
            agent_trace: Vec::new(),
            retry_count: attempt,
            started_at: Utc::now(),
        }
    }

    pub fn trace(&mut self, line: impl Into<String>) {
        self.agent_trace.push(line.into());
    }

    pub fn record_subtask(&mut self, subtask: &Subtask, output: String) {
        self.specialist_outputs.insert(subtask.agent_type, output);
        self.completed_tasks.push(subtask.id);
        self.trace(format!("{}: Completed {}", subtask.agent_type, subtask.name));
    }

    pub fn is_approved(&self) -> bool {
        self.safety_approval.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_keep_first_insertion_order() {
        let mut outputs = SpecialistOutputs::default();
        outputs.insert(AgentType::Designer, "d1".into());
        outputs.insert(AgentType::Researcher, "r1".into());
        outputs.insert(AgentType::Designer, "d2".into());

        let order: Vec<_> = outputs.iter().collect();
        assert_eq!(
            order,
            vec![(AgentType::Designer, "d2"), (AgentType::Researcher, "r1")]
        );
        assert_eq!(outputs.len(), 2);
    }

    #[test]
    fn test_record_subtask_updates_everything() {
        let mut state = RunState::new("Build a rocket", 1);
        let subtask = Subtask::new(3, "Write the code", AgentType::Coder);

        state.record_subtask(&subtask, "fn launch() {}".into());

        assert_eq!(state.completed_tasks, vec![3]);
        assert_eq!(
            state.specialist_outputs.get(AgentType::Coder),
            Some("fn launch() {}")
        );
        assert_eq!(state.agent_trace, vec!["coder: Completed Write the code"]);
    }

    #[test]
    fn test_new_state_starts_with_user_message() {
        let state = RunState::new("Build a rocket", 2);
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].content, "Build a rocket");
        assert_eq!(state.retry_count, 2);
        assert!(!state.is_approved());
    }
}
