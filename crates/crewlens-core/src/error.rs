use thiserror::Error;

/// A convenience `Result` alias using [`CrewlensError`].
pub type CrewlensResult<T> = Result<T, CrewlensError>;

/// Top-level error type for crewlens.
///
/// Each variant corresponds to a subsystem that can produce errors. None of
/// them is fatal to a running session: transport errors trigger a reconnect,
/// protocol errors drop the offending frame.
#[derive(Error, Debug)]
pub enum CrewlensError {
    /// The persistent channel could not be opened or failed while open.
    #[error("Connection error: {0}")]
    Connection(String),

    /// An inbound frame was malformed or did not match the envelope contract.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The session actor is gone or rejected a command.
    #[error("Session error: {0}")]
    Session(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
