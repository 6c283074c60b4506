use chrono::{DateTime, Utc};
use crewlens_core::{ActivityKind, AgentStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry of an agent's activity log. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// What happened.
    pub kind: ActivityKind,
    /// When it happened, per the server when it said so.
    pub time: DateTime<Utc>,
    /// Input handed to the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Output produced by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Reasoning trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Handoff source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Handoff target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl ActivityEvent {
    /// A bare event of the given kind.
    pub fn new(kind: ActivityKind, time: DateTime<Utc>) -> Self {
        Self {
            kind,
            time,
            input: None,
            output: None,
            thinking: None,
            from: None,
            to: None,
        }
    }

    /// Attach the input text.
    pub fn with_input(mut self, input: Option<String>) -> Self {
        self.input = input.filter(|s| !s.is_empty());
        self
    }

    /// Attach the output text.
    pub fn with_output(mut self, output: Option<String>) -> Self {
        self.output = output.filter(|s| !s.is_empty());
        self
    }

    /// Attach a reasoning trace.
    pub fn with_thinking(mut self, thinking: Option<String>) -> Self {
        self.thinking = thinking.filter(|s| !s.is_empty());
        self
    }

    /// Attach handoff endpoints.
    pub fn with_handoff(mut self, from: &str, to: &str) -> Self {
        self.from = Some(from.to_string());
        self.to = Some(to.to_string());
        self
    }
}

/// Canonical state of one agent within the active request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    /// Agent name, as used on the wire.
    pub name: String,
    /// Current status.
    pub status: AgentStatus,
    /// Most recent reasoning trace.
    pub last_thinking: Option<String>,
    /// Most recent error.
    pub last_error: Option<String>,
    /// Activity log in arrival order.
    pub activities: Vec<ActivityEvent>,
}

impl AgentState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: AgentStatus::Idle,
            last_thinking: None,
            last_error: None,
            activities: Vec::new(),
        }
    }
}

/// A status change reported back to the caller so it can update the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Status before the change.
    pub from: AgentStatus,
    /// Status after the change.
    pub to: AgentStatus,
}

/// Agent name to state, in first-seen order.
///
/// Mutators return `Some(Transition)` only when the status actually changed.
/// `error` is sticky: once an agent fails, further activities are still
/// logged but its status stays `error` until [`reset`](Self::reset).
#[derive(Debug, Clone, Default)]
pub struct AgentStateStore {
    agents: Vec<AgentState>,
    index: HashMap<String, usize>,
}

impl AgentStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every agent.
    pub fn reset(&mut self) {
        self.agents.clear();
        self.index.clear();
    }

    /// Ensure an entry exists for `name`, idle when new.
    pub fn upsert_agent(&mut self, name: &str) -> &mut AgentState {
        let idx = match self.index.get(name) {
            Some(idx) => *idx,
            None => {
                self.agents.push(AgentState::new(name));
                let idx = self.agents.len() - 1;
                self.index.insert(name.to_string(), idx);
                idx
            }
        };
        &mut self.agents[idx]
    }

    /// Look up an agent.
    pub fn get(&self, name: &str) -> Option<&AgentState> {
        self.index.get(name).map(|idx| &self.agents[*idx])
    }

    /// Number of known agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agent is known.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    fn change(state: &mut AgentState, to: AgentStatus) -> Option<Transition> {
        let from = state.status;
        if from == to || (from == AgentStatus::Error && to != AgentStatus::Error) {
            return None;
        }
        state.status = to;
        Some(Transition { from, to })
    }

    /// Append an activity and apply its status effect.
    pub fn apply_activity(&mut self, name: &str, event: ActivityEvent) -> Option<Transition> {
        let state = self.upsert_agent(name);
        let target = match event.kind {
            ActivityKind::HandoffIn => Some(AgentStatus::Assigned),
            ActivityKind::HandoffOut => Some(AgentStatus::Idle),
            ActivityKind::Thinking => Some(AgentStatus::Thinking),
            ActivityKind::Processing => Some(AgentStatus::Active),
            ActivityKind::Generic => None,
        };
        if event.kind == ActivityKind::Thinking {
            if let Some(text) = &event.thinking {
                state.last_thinking = Some(text.clone());
            }
        }
        state.activities.push(event);
        target.and_then(|to| Self::change(state, to))
    }

    /// Set an explicit status.
    pub fn set_status(&mut self, name: &str, status: AgentStatus) -> Option<Transition> {
        let state = self.upsert_agent(name);
        Self::change(state, status)
    }

    /// Move an agent to `error` and remember the message.
    pub fn record_error(&mut self, name: &str, message: &str) -> Option<Transition> {
        let state = self.upsert_agent(name);
        state.last_error = Some(message.to_string());
        Self::change(state, AgentStatus::Error)
    }

    /// Return every non-error agent to idle. Returns the agents that changed.
    pub fn idle_all(&mut self) -> Vec<(String, Transition)> {
        self.agents
            .iter_mut()
            .filter_map(|state| {
                Self::change(state, AgentStatus::Idle).map(|t| (state.name.clone(), t))
            })
            .collect()
    }

    /// Owned copy of every agent in first-seen order.
    pub fn snapshot(&self) -> Vec<AgentState> {
        self.agents.clone()
    }
}
