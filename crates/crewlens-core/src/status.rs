use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle status of a single agent within the active request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Not participating in the current request.
    #[default]
    Idle,
    /// Received a handoff or assignment but has not started yet.
    Assigned,
    /// Currently processing the request.
    Active,
    /// Producing an intermediate reasoning trace.
    Thinking,
    /// Executing a workflow step.
    Working,
    /// Reported an error; sticky until the next request starts.
    Error,
}

impl AgentStatus {
    /// Whether entering this status makes the agent the head of the
    /// execution path in the interaction graph.
    pub fn is_engaged(self) -> bool {
        matches!(self, Self::Assigned | Self::Active | Self::Thinking)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Assigned => "assigned",
            Self::Active => "active",
            Self::Thinking => "thinking",
            Self::Working => "working",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "assigned" => Ok(Self::Assigned),
            "active" => Ok(Self::Active),
            "thinking" => Ok(Self::Thinking),
            "working" => Ok(Self::Working),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown agent status '{other}'")),
        }
    }
}

/// Status of a directed link in the interaction graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// The hot link of the current execution path.
    Active,
    /// One endpoint reported an error.
    Error,
    /// A link that was part of the path earlier in the request.
    Inactive,
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Error => write!(f, "error"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

/// Kind of a node in the interaction graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// The single human user node.
    User,
    /// A backend agent.
    Agent,
}

/// Global backend readiness as reported by `system_status` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemReadiness {
    /// No status received yet.
    #[default]
    Unknown,
    /// The backend is still starting its agents.
    Initializing,
    /// Initialization is taking longer than expected.
    Delayed,
    /// The backend is ready to accept requests.
    Initialized,
    /// The backend rejected a request because it is not ready.
    NotReady,
}

impl SystemReadiness {
    /// Map a wire status string; unrecognised values yield `None`.
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "initializing" => Some(Self::Initializing),
            "initialization_delayed" => Some(Self::Delayed),
            "initialized" | "ready" => Some(Self::Initialized),
            "not_ready" => Some(Self::NotReady),
            _ => None,
        }
    }

    /// Whether the backend accepts requests.
    pub fn is_ready(self) -> bool {
        self == Self::Initialized
    }
}

/// Kind of an entry in an agent's activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// The agent received responsibility for the request.
    HandoffIn,
    /// The agent passed responsibility to another agent.
    HandoffOut,
    /// Intermediate reasoning trace.
    Thinking,
    /// The agent started processing input.
    Processing,
    /// Anything else the backend reports.
    Generic,
}

impl ActivityKind {
    /// Classify an `activity_type` string from an `agent_activity` event.
    pub fn from_activity_type(activity_type: &str) -> Self {
        match activity_type.trim().to_ascii_lowercase().as_str() {
            "handoff_in" | "handoff_received" | "received_handoff" => Self::HandoffIn,
            "handoff_out" | "handoff_sent" | "handoff" => Self::HandoffOut,
            "thinking" | "thought" => Self::Thinking,
            "processing" | "processing_start" | "process" | "working" => Self::Processing,
            _ => Self::Generic,
        }
    }
}
