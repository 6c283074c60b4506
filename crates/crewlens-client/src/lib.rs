//! Client runtime for crewlens.
//!
//! [`ConnectionManager`] keeps a WebSocket to the agent backend alive and
//! [`SessionRuntime`] folds what arrives into a [`crewlens_session::Session`]
//! owned by a single task. Hosts drive it through a [`SessionHandle`].

/// `crewlens.toml` loading.
pub mod config;
/// Connection state machine and supervisor.
pub mod connection;
/// Session actor.
pub mod runtime;

pub use config::{load_config, parse_config, ClientConfig, ServerConfig, DEFAULT_CONFIG_FILE};
pub use connection::{ConnectionEvent, ConnectionInput, ConnectionManager, ConnectionState};
pub use runtime::{SessionHandle, SessionRuntime};
