//! Server and client configuration.
//!
//! Both configs deserialize from YAML with every field defaulted, then take
//! environment overrides. Clients without an explicit address read the port
//! file the daemon writes on startup.

use crate::geofence_paths;
use crate::rpc::{Destination, OBJECT_PATH, SERVICE_NAME};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default deadline for every client call.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
/// Longer configured timeouts are clamped to this.
pub const MAX_CALL_TIMEOUT_SECS: u64 = 24 * 60 * 60;

pub const PORT_ENV: &str = "GEOFENCE_PORT";
pub const SIGNAL_PORT_ENV: &str = "GEOFENCE_SIGNAL_PORT";
pub const CALL_TIMEOUT_ENV: &str = "GEOFENCE_CALL_TIMEOUT_SECS";

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_service_name() -> String {
    SERVICE_NAME.to_string()
}

fn default_object_path() -> String {
    OBJECT_PATH.to_string()
}

fn default_call_timeout_secs() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

fn env_u16(name: &str) -> Option<u16> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Method listener port; 0 picks an ephemeral port.
    #[serde(default)]
    pub port: u16,
    /// Signal listener port; 0 picks an ephemeral port.
    #[serde(default)]
    pub signal_port: u16,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_object_path")]
    pub object_path: String,
    /// Human-readable server name, logged on startup.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            signal_port: 0,
            service_name: default_service_name(),
            object_path: default_object_path(),
            name: None,
            description: None,
        }
    }
}

impl ServerConfig {
    /// Load from `path` (or the default config path if it exists), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = geofence_paths::default_config_path()?;
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env_u16(PORT_ENV) {
            self.port = port;
        }
        if let Some(port) = env_u16(SIGNAL_PORT_ENV) {
            self.signal_port = port;
        }
    }

    pub fn method_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn signal_addr(&self) -> String {
        format!("{}:{}", self.host, self.signal_port)
    }

    /// The destination clients address method calls to.
    pub fn destination(&self) -> Destination {
        Destination::new(self.service_name.clone(), self.object_path.clone())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Method port; read from the port file when absent.
    #[serde(default)]
    pub port: Option<u16>,
    /// Signal port; read from the port file when absent.
    #[serde(default)]
    pub signal_port: Option<u16>,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_object_path")]
    pub object_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            signal_port: None,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            service_name: default_service_name(),
            object_path: default_object_path(),
        }
    }
}

impl ClientConfig {
    /// Config that targets explicit method and signal ports on `host`.
    pub fn with_ports(host: impl Into<String>, port: u16, signal_port: u16) -> Self {
        Self {
            host: host.into(),
            port: Some(port),
            signal_port: Some(signal_port),
            ..Self::default()
        }
    }

    /// Default config with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env_u16(PORT_ENV) {
            self.port = Some(port);
        }
        if let Some(port) = env_u16(SIGNAL_PORT_ENV) {
            self.signal_port = Some(port);
        }
        if let Some(secs) = env_u64(CALL_TIMEOUT_ENV) {
            self.call_timeout_secs = secs;
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.clamp(1, MAX_CALL_TIMEOUT_SECS))
    }

    pub fn destination(&self) -> Destination {
        Destination::new(self.service_name.clone(), self.object_path.clone())
    }

    /// Method and signal addresses, falling back to the port file for
    /// whichever port is not configured.
    pub fn endpoints(&self) -> Result<(String, String)> {
        let (port, signal_port) = match (self.port, self.signal_port) {
            (Some(port), Some(signal_port)) => (port, signal_port),
            (port, signal_port) => {
                let from_file = read_port_file(&geofence_paths::port_file_path()?)?;
                (
                    port.unwrap_or(from_file.port),
                    signal_port.unwrap_or(from_file.signal_port),
                )
            }
        };
        Ok((
            format!("{}:{}", self.host, port),
            format!("{}:{}", self.host, signal_port),
        ))
    }
}

/// Port file content written by the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortFileContent {
    pub port: u16,
    pub signal_port: u16,
}

pub fn write_port_file(path: &Path, content: &PortFileContent) -> Result<()> {
    let json = serde_json::to_string(content).context("Failed to serialize port file")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write port file: {}", path.display()))
}

pub fn read_port_file(path: &Path) -> Result<PortFileContent> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read port file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse port file: {}", path.display()))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
