//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (HULA_HOST, HULA_PORT, HULA_ENVIRONMENT)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development; reconnecting clients are told to reload.
    #[default]
    Dev,
    /// Production.
    Production,
}

impl Environment {
    /// Whether reconnecting clients should reload.
    #[must_use]
    pub fn live_reload(self) -> bool {
        self == Environment::Dev
    }

    fn from_env() -> Option<Self> {
        match std::env::var("HULA_ENVIRONMENT").ok()?.to_ascii_lowercase().as_str() {
            "dev" | "development" => Some(Environment::Dev),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment.
    #[serde(default = "default_environment")]
    pub environment: Environment,

    /// Directory holding `index.html`.
    #[serde(default)]
    pub webroot: Option<PathBuf>,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the WebSocket channel endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Largest rendered html a call may return; larger results are answered
    /// with an error.
    #[serde(default = "default_max_response_size")]
    pub max_response_size: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_host() -> String {
    std::env::var("HULA_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("HULA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000)
}

fn default_environment() -> Environment {
    Environment::from_env().unwrap_or_default()
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_message_size() -> usize {
    hula_transport::DEFAULT_MAX_MESSAGE_SIZE
}

fn default_max_response_size() -> usize {
    hula_protocol::codec::MAX_FRAME_SIZE
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            webroot: None,
            transport: TransportConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            max_message_size: default_max_message_size(),
            max_response_size: default_max_response_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "hula.toml",
            "/etc/hula/hula.toml",
            "~/.config/hula/hula.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}
