//! Live session state for crewlens.
//!
//! [`Session`] folds the inbound event stream into a conversation
//! [`Transcript`], an [`AgentStateStore`] and an [`InteractionGraph`],
//! dropping events that belong to superseded requests.

/// Per-agent status and activity log.
pub mod agents;
/// User and agent nodes with the active handoff path.
pub mod graph;
/// Force-directed positions for the graph.
pub mod layout;
/// Final-answer normalization.
pub mod normalizer;
/// Event application.
pub mod session;
/// Active request correlation.
pub mod tracker;
/// Conversation log.
pub mod transcript;

pub use agents::{ActivityEvent, AgentState, AgentStateStore, Transition};
pub use graph::{GraphLink, GraphNode, GraphSnapshot, InteractionGraph, USER_NODE_ID};
pub use layout::{ForceLayout, LayoutParams, NodePosition};
pub use normalizer::{normalize, strip_scripted_dialogue, NormalizedResponse, NormalizerConfig};
pub use session::{ApplyOutcome, Session, SessionConfig, SessionSnapshot};
pub use tracker::RequestTracker;
pub use transcript::{Message, MessageKind, Transcript};
