//! `crewlens.toml` configuration.
//!
//! Every section and key is optional; an empty file yields the defaults.

use crewlens_core::{CrewlensError, CrewlensResult};
use crewlens_session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "crewlens.toml";

/// Top-level client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Connection settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Session settings.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// WebSocket endpoint of the agent backend.
    #[serde(default = "default_url")]
    pub url: String,
    /// Fixed delay between reconnect attempts.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Keep-alive ping interval; `0` disables pings.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
}

impl ServerConfig {
    /// Delay between reconnect attempts.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Keep-alive interval, if enabled.
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_ms > 0).then(|| Duration::from_millis(self.ping_interval_ms))
    }

    /// Check that the endpoint is a WebSocket URL.
    pub fn validate(&self) -> CrewlensResult<()> {
        if self.url.starts_with("ws://") || self.url.starts_with("wss://") {
            Ok(())
        } else {
            Err(CrewlensError::Config(format!(
                "server.url must start with ws:// or wss://, got '{}'",
                self.url
            )))
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            ping_interval_ms: default_ping_interval_ms(),
        }
    }
}

fn default_url() -> String {
    "ws://localhost:8000/ws".to_string()
}
fn default_reconnect_delay_ms() -> u64 {
    2000
}
fn default_ping_interval_ms() -> u64 {
    30_000
}

/// Read and parse a TOML config file.
pub fn parse_config(path: &Path) -> CrewlensResult<ClientConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CrewlensError::Config(format!(
            "Failed to read config '{}': {}",
            path.display(),
            e
        ))
    })?;
    let config: ClientConfig = toml::from_str(&content).map_err(|e| {
        CrewlensError::Config(format!(
            "Failed to parse config '{}': {}",
            path.display(),
            e
        ))
    })?;
    config.server.validate()?;
    Ok(config)
}

/// Load the config at `path`. A missing file falls back to the defaults
/// unless the path was given explicitly.
pub fn load_config(path: &Path, explicit: bool) -> CrewlensResult<ClientConfig> {
    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(ClientConfig::default());
    }
    parse_config(path)
}
