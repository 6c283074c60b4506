//! Shared vocabulary of the crewlens crates.
//!
//! [`CrewlensError`] and [`CrewlensResult`] are used by every crate.
//! [`ServerEvent`] and [`ClientMessage`] describe the JSON frames exchanged
//! with the agent backend, and [`AgentStatus`] with its sibling enums names
//! the states the session views render.

/// Error types.
pub mod error;
/// Inbound/outbound message envelopes.
pub mod protocol;
/// Status vocabularies shared by the session views.
pub mod status;

pub use error::{CrewlensError, CrewlensResult};
pub use protocol::{
    parse_timestamp, value_text, ClientMessage, ServerEvent, SERVER_EVENT_TYPES,
};
pub use status::{ActivityKind, AgentStatus, LinkStatus, NodeKind, SystemReadiness};
