//! Wire protocol between the agent backend and a crewlens client.
//!
//! Inbound frames are JSON objects with a `type` discriminator. Decoding is
//! two-staged: [`ServerEvent::from_value`] first checks the discriminator
//! against [`SERVER_EVENT_TYPES`] so that unknown event types can be ignored
//! for forward compatibility, then deserializes the typed variant.

use crate::{CrewlensError, CrewlensResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Every `type` value the client understands.
pub const SERVER_EVENT_TYPES: &[&str] = &[
    "connection_established",
    "agent_info",
    "system_status",
    "agent_update",
    "agent_status_update",
    "agent_states_update",
    "agent_assigned",
    "agent_activity",
    "agent_handoff",
    "agent_thinking",
    "agent_error",
    "workflow_step",
    "request_start",
    "request_received",
    "request_complete",
    "request_error",
    "response",
    "error",
    "pong",
];

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The server accepted the connection.
    ConnectionEstablished {
        /// Server-assigned id of this client.
        #[serde(default)]
        client_id: Option<String>,
        /// Whether the backend already accepts requests.
        #[serde(default)]
        system_ready: Option<bool>,
        /// Human-readable notice.
        #[serde(default)]
        message: Option<String>,
    },
    /// Static agent registry, sent once per connection.
    AgentInfo {
        /// Agent name to description.
        #[serde(default)]
        agent_descriptions: BTreeMap<String, String>,
        /// Agent name to status string.
        #[serde(default)]
        agent_states: BTreeMap<String, String>,
    },
    /// Global readiness indicator.
    SystemStatus {
        /// Readiness string, see `SystemReadiness::parse`.
        status: String,
        /// Human-readable notice.
        #[serde(default)]
        message: Option<String>,
    },
    /// Explicit status change for one agent, or a bulk map of statuses.
    #[serde(alias = "agent_status_update")]
    AgentUpdate {
        /// Agent name.
        #[serde(default, alias = "agent_name")]
        agent: Option<String>,
        /// New status of `agent`.
        #[serde(default)]
        status: Option<String>,
        /// Agent name to status string.
        #[serde(default)]
        agent_states: BTreeMap<String, String>,
        /// Request the event belongs to.
        #[serde(default)]
        request_id: Option<String>,
    },
    /// Bulk status change, e.g. everyone back to idle after completion.
    AgentStatesUpdate {
        /// Status applied to every agent.
        #[serde(default)]
        status: Option<String>,
        /// Per-agent statuses.
        #[serde(default)]
        agent_states: BTreeMap<String, String>,
        /// Request the event belongs to.
        #[serde(default)]
        request_id: Option<String>,
    },
    /// An agent was enlisted for the request.
    AgentAssigned {
        /// Agent name.
        #[serde(alias = "agent_name")]
        agent: String,
        /// Request the event belongs to.
        #[serde(default)]
        request_id: Option<String>,
    },
    /// A generic activity record for one agent.
    AgentActivity {
        /// Agent name.
        #[serde(alias = "agent_name")]
        agent: String,
        /// Free-form activity kind, see `ActivityKind::from_activity_type`.
        activity_type: String,
        /// When the server produced the event.
        #[serde(default)]
        timestamp: Option<Value>,
        /// Request the event belongs to.
        #[serde(default)]
        request_id: Option<String>,
        /// Activity payload.
        #[serde(default)]
        content: Option<Value>,
        /// Input handed to the agent.
        #[serde(default)]
        input: Option<Value>,
        /// Output produced by the agent.
        #[serde(default)]
        output: Option<Value>,
        /// Reasoning trace.
        #[serde(default)]
        thinking: Option<String>,
    },
    /// Responsibility moved from one agent to another.
    AgentHandoff {
        /// Agent giving up responsibility.
        from_agent: String,
        /// Agent taking over.
        to_agent: String,
        /// Request the event belongs to.
        #[serde(default)]
        request_id: Option<String>,
        /// Input passed to `to_agent`.
        #[serde(default)]
        input: Option<Value>,
        /// Why the handoff happened.
        #[serde(default)]
        thinking: Option<String>,
        /// When the server produced the event.
        #[serde(default)]
        timestamp: Option<Value>,
    },
    /// Intermediate reasoning trace.
    AgentThinking {
        /// Agent name.
        #[serde(alias = "agent_name")]
        agent: String,
        /// Reasoning trace.
        thinking: String,
        /// Request the event belongs to.
        #[serde(default)]
        request_id: Option<String>,
        /// When the server produced the event.
        #[serde(default)]
        timestamp: Option<Value>,
    },
    /// An agent failed.
    AgentError {
        /// Agent name.
        #[serde(alias = "agent_name")]
        agent: String,
        /// Error text.
        error: String,
        /// Request the event belongs to.
        #[serde(default)]
        request_id: Option<String>,
    },
    /// Progress notice from the orchestrator.
    WorkflowStep {
        /// Human-readable notice.
        #[serde(default)]
        message: Option<String>,
        /// Agent performing the step.
        #[serde(default, alias = "agent")]
        agent_name: Option<String>,
        /// Step name.
        #[serde(default)]
        step: Option<String>,
        /// Request the event belongs to.
        #[serde(default)]
        request_id: Option<String>,
    },
    /// A new request began; supersedes every earlier request.
    RequestStart {
        /// Request the event belongs to.
        request_id: String,
        /// Optional notice.
        #[serde(default)]
        message: Option<String>,
    },
    /// Acknowledgement variant of `request_start` used by older servers.
    RequestReceived {
        /// Request the event belongs to.
        request_id: String,
        /// Human-readable notice.
        #[serde(default)]
        message: Option<String>,
    },
    /// The request finished.
    RequestComplete {
        /// Request the event belongs to.
        request_id: String,
        /// Human-readable notice.
        #[serde(default)]
        message: Option<String>,
    },
    /// The request failed as a whole.
    RequestError {
        /// Why the request failed.
        #[serde(default)]
        message: String,
        /// Request the event belongs to.
        #[serde(default)]
        request_id: Option<String>,
    },
    /// The final answer. `content` may have any shape; servers that send a
    /// flat envelope put the answer fields next to `type` instead.
    Response {
        /// Answer payload of any shape.
        #[serde(default)]
        content: Option<Value>,
        /// Request the event belongs to.
        #[serde(default)]
        request_id: Option<String>,
        /// Flat answer fields when `content` is absent.
        #[serde(flatten)]
        fields: Map<String, Value>,
    },
    /// Non-fatal server error.
    Error {
        /// Error text.
        #[serde(default)]
        message: String,
        /// Request the event belongs to.
        #[serde(default)]
        request_id: Option<String>,
    },
    /// Keep-alive reply.
    Pong {
        /// Echo of the ping timestamp.
        #[serde(default)]
        timestamp: Option<Value>,
    },
}

impl ServerEvent {
    /// Decode a parsed frame.
    ///
    /// Returns `Ok(None)` for a well-formed envelope whose `type` is not in
    /// [`SERVER_EVENT_TYPES`]; returns a protocol error when the frame is not
    /// an object, lacks a `type`, or a known type is missing required fields.
    pub fn from_value(value: Value) -> CrewlensResult<Option<Self>> {
        let event_type = match &value {
            Value::Object(map) => match map.get("type") {
                Some(Value::String(t)) => t.clone(),
                Some(_) => {
                    return Err(CrewlensError::Protocol(
                        "envelope 'type' is not a string".into(),
                    ))
                }
                None => {
                    return Err(CrewlensError::Protocol(
                        "envelope is missing 'type'".into(),
                    ))
                }
            },
            _ => {
                return Err(CrewlensError::Protocol(
                    "envelope is not a JSON object".into(),
                ))
            }
        };

        if !SERVER_EVENT_TYPES.contains(&event_type.as_str()) {
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| CrewlensError::Protocol(format!("invalid '{event_type}' event: {e}")))
    }

    /// Wire name of this event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection_established",
            Self::AgentInfo { .. } => "agent_info",
            Self::SystemStatus { .. } => "system_status",
            Self::AgentUpdate { .. } => "agent_update",
            Self::AgentStatesUpdate { .. } => "agent_states_update",
            Self::AgentAssigned { .. } => "agent_assigned",
            Self::AgentActivity { .. } => "agent_activity",
            Self::AgentHandoff { .. } => "agent_handoff",
            Self::AgentThinking { .. } => "agent_thinking",
            Self::AgentError { .. } => "agent_error",
            Self::WorkflowStep { .. } => "workflow_step",
            Self::RequestStart { .. } => "request_start",
            Self::RequestReceived { .. } => "request_received",
            Self::RequestComplete { .. } => "request_complete",
            Self::RequestError { .. } => "request_error",
            Self::Response { .. } => "response",
            Self::Error { .. } => "error",
            Self::Pong { .. } => "pong",
        }
    }

    /// Request id carried by the event, if any.
    ///
    /// For `response` the id may sit either on the envelope or inside the
    /// structured content.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::AgentUpdate { request_id, .. }
            | Self::AgentStatesUpdate { request_id, .. }
            | Self::AgentAssigned { request_id, .. }
            | Self::AgentActivity { request_id, .. }
            | Self::AgentHandoff { request_id, .. }
            | Self::AgentThinking { request_id, .. }
            | Self::AgentError { request_id, .. }
            | Self::WorkflowStep { request_id, .. }
            | Self::RequestError { request_id, .. }
            | Self::Error { request_id, .. } => request_id.as_deref(),
            Self::RequestStart { request_id, .. }
            | Self::RequestReceived { request_id, .. }
            | Self::RequestComplete { request_id, .. } => Some(request_id.as_str()),
            Self::Response {
                content,
                request_id,
                ..
            } => request_id.as_deref().or_else(|| {
                content
                    .as_ref()
                    .and_then(|c| c.get("request_id"))
                    .and_then(Value::as_str)
            }),
            Self::ConnectionEstablished { .. }
            | Self::AgentInfo { .. }
            | Self::SystemStatus { .. }
            | Self::Pong { .. } => None,
        }
    }

    /// Whether the event belongs to a request and must be correlated with
    /// the active one before it is applied.
    ///
    /// `request_start`/`request_received` open a scope rather than belong to
    /// one, and `error` is always surfaced.
    pub fn is_request_scoped(&self) -> bool {
        !matches!(
            self,
            Self::ConnectionEstablished { .. }
                | Self::AgentInfo { .. }
                | Self::SystemStatus { .. }
                | Self::RequestStart { .. }
                | Self::RequestReceived { .. }
                | Self::Error { .. }
                | Self::Pong { .. }
        )
    }
}

/// An outbound message from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Submit a user request. The id is an opaque client token; the server
    /// remains the authority for ids used in activity events.
    Request {
        /// Text typed by the user.
        content: String,
        /// Client-chosen correlation token.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    /// Keep-alive message, answered with `pong`.
    Ping {
        /// Milliseconds since the Unix epoch.
        timestamp: i64,
    },
    /// Ask the server to resend all agent statuses.
    GetAgentStatus,
}

impl ClientMessage {
    /// Build a request message.
    pub fn request(content: impl Into<String>, request_id: Option<String>) -> Self {
        Self::Request {
            content: content.into(),
            request_id,
        }
    }

    /// Build a ping stamped with the current time in milliseconds.
    pub fn ping() -> Self {
        Self::Ping {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Serialize to the JSON text sent over the channel.
    pub fn to_json(&self) -> CrewlensResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Render a loosely-typed field as display text: strings verbatim, `null`
/// as empty, anything else as compact JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse a wire timestamp, falling back to now.
///
/// Servers send RFC 3339, naive ISO-8601 (`datetime.isoformat()` without an
/// offset, taken as UTC) or epoch seconds/milliseconds.
pub fn parse_timestamp(value: Option<&Value>) -> DateTime<Utc> {
    let parsed = match value {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        Some(Value::Number(n)) => n.as_i64().and_then(|raw| {
            if raw > 10_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }),
        _ => None,
    };
    parsed.unwrap_or_else(Utc::now)
}
