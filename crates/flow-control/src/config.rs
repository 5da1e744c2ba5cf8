//! Configuration for flow-control.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};
use crate::log_buffer::DEFAULT_DEPTH;

/// Top-level configuration for the command worker.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ControlConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-host node protocol configuration.
    #[serde(default)]
    pub node: NodeConfig,

    /// Fan-out behaviour.
    #[serde(default)]
    pub fleet: FleetConfig,

    /// Deployment behaviour configuration.
    #[serde(default)]
    pub deployment: DeploymentConfig,
}

impl ControlConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `flow.toml` in the current directory (if present)
    /// 3. Environment variables with `FLOW_CONTROL_` prefix
    pub fn load() -> ControlResult<Self> {
        Figment::new()
            .merge(Toml::file("flow.toml"))
            .merge(Env::prefixed("FLOW_CONTROL_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ControlResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("FLOW_CONTROL_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8085)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Per-host node protocol configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Which connector implementation to use.
    #[serde(default)]
    pub connector_type: ConnectorType,

    /// Port of the node service on every host.
    #[serde(default = "default_node_port")]
    pub port: u16,

    /// URL scheme for node requests.
    #[serde(default = "default_node_scheme")]
    pub scheme: String,

    /// Request timeout in seconds.
    #[serde(default = "default_node_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_node_port() -> u16 {
    10053
}

fn default_node_scheme() -> String {
    "http".to_owned()
}

const fn default_node_timeout_secs() -> u64 {
    120
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            connector_type: ConnectorType::default(),
            port: default_node_port(),
            scheme: default_node_scheme(),
            timeout_secs: default_node_timeout_secs(),
        }
    }
}

/// Type of node connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorType {
    /// HTTP node service.
    #[default]
    Http,

    /// Mock connector for testing.
    Mock,
}

/// Fan-out behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    /// Upper bound on a single host's operation, in seconds.
    #[serde(default = "default_host_timeout_secs")]
    pub host_timeout_secs: u64,
}

const fn default_host_timeout_secs() -> u64 {
    130
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            host_timeout_secs: default_host_timeout_secs(),
        }
    }
}

/// Deployment behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    /// Progress lines buffered before they are streamed to the caller.
    #[serde(default = "default_log_depth")]
    pub log_depth: usize,

    /// Save each command's transcript to the deploy log namespace.
    #[serde(default = "default_persist_logs")]
    pub persist_logs: bool,
}

const fn default_log_depth() -> usize {
    DEFAULT_DEPTH
}

const fn default_persist_logs() -> bool {
    true
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            log_depth: default_log_depth(),
            persist_logs: default_persist_logs(),
        }
    }
}
