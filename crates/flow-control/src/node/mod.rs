//! Per-host process control.
//!
//! Each fleet host runs a node service that starts and stops applications and
//! holds a local copy of the routing groups. [`NodeConnector`] opens a
//! [`NodeHandle`] to one host; [`execute`] runs a single [`NodeCommand`] over
//! a fresh handle and always disconnects it afterwards.

mod http;

pub use http::HttpNodeConnector;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ConnectorType, NodeConfig};
use crate::error::{ControlError, ControlResult};
use crate::types::RoutingGroup;

/// Opens connections to node services.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    /// Connect to the node service on `host`.
    async fn connect(&self, host: &str) -> ControlResult<Box<dyn NodeHandle>>;
}

/// An open connection to one host's node service.
#[async_trait]
pub trait NodeHandle: Send + Sync {
    /// Start `app_id` with `profile`.
    async fn start_app(&self, app_id: &str, profile: &str) -> ControlResult<()>;

    /// Stop `app_id`.
    async fn stop_app(&self, app_id: &str) -> ControlResult<()>;

    /// Runtime information about `app_id`.
    async fn info(&self, app_id: &str) -> ControlResult<Value>;

    /// Replace the host's local copy of routing group `name`.
    async fn refresh_group(&self, name: &str, group: &RoutingGroup) -> ControlResult<()>;

    /// Release the connection.
    async fn disconnect(&self);
}

/// A single operation against one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCommand {
    /// Start an application.
    Start {
        /// Application identifier.
        app_id: String,
        /// Profile to run with.
        profile: String,
    },
    /// Stop an application.
    Stop {
        /// Application identifier.
        app_id: String,
    },
    /// Query application info.
    Info {
        /// Application identifier.
        app_id: String,
    },
    /// Push a routing group table.
    RefreshGroup {
        /// Group name.
        name: String,
        /// Current membership.
        group: RoutingGroup,
    },
}

/// Connect to `host`, run `command`, and disconnect.
///
/// The handle is disconnected whether or not the command succeeded.
pub async fn execute(
    connector: &dyn NodeConnector,
    host: &str,
    command: &NodeCommand,
) -> ControlResult<Value> {
    let mut values = execute_all(connector, host, std::slice::from_ref(command)).await?;
    Ok(values.pop().unwrap_or(Value::Null))
}

/// Run several commands over one connection, stopping at the first failure.
///
/// The handle is disconnected whether or not the commands succeeded, and also
/// when this future is dropped mid-command (for example by a fan-out timeout).
pub async fn execute_all(
    connector: &dyn NodeConnector,
    host: &str,
    commands: &[NodeCommand],
) -> ControlResult<Vec<Value>> {
    let connection = Connection::new(host, connector.connect(host).await?);

    let mut values = Vec::with_capacity(commands.len());
    let mut result = Ok(());
    for command in commands {
        match run_command(connection.handle(), command).await {
            Ok(value) => values.push(value),
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }

    connection.close().await;
    debug!(
        host = %host,
        commands = commands.len(),
        ok = result.is_ok(),
        "node commands finished"
    );
    result.map(|()| values)
}

/// An open handle that is released on every exit path.
///
/// [`close`](Self::close) disconnects inline. Dropping an unclosed connection
/// hands the disconnect to a background task.
struct Connection {
    host: String,
    handle: Arc<dyn NodeHandle>,
    closed: bool,
}

impl Connection {
    fn new(host: &str, handle: Box<dyn NodeHandle>) -> Self {
        Self {
            host: host.to_owned(),
            handle: Arc::from(handle),
            closed: false,
        }
    }

    fn handle(&self) -> &dyn NodeHandle {
        self.handle.as_ref()
    }

    async fn close(mut self) {
        self.closed = true;
        self.handle.disconnect().await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(host = %self.host, "node command cancelled, disconnecting");
                let handle = Arc::clone(&self.handle);
                runtime.spawn(async move { handle.disconnect().await });
            }
            Err(_) => warn!(host = %self.host, "no runtime left to disconnect node handle"),
        }
    }
}

async fn run_command(handle: &dyn NodeHandle, command: &NodeCommand) -> ControlResult<Value> {
    match command {
        NodeCommand::Start { app_id, profile } => {
            handle.start_app(app_id, profile).await.map(|()| Value::Null)
        }
        NodeCommand::Stop { app_id } => handle.stop_app(app_id).await.map(|()| Value::Null),
        NodeCommand::Info { app_id } => handle.info(app_id).await,
        NodeCommand::RefreshGroup { name, group } => {
            handle.refresh_group(name, group).await.map(|()| Value::Null)
        }
    }
}

/// Create a connector from configuration.
pub fn create_connector(config: &NodeConfig) -> ControlResult<Arc<dyn NodeConnector>> {
    match config.connector_type {
        ConnectorType::Http => Ok(Arc::new(HttpNodeConnector::new(config)?)),
        ConnectorType::Mock => Ok(Arc::new(MockConnector::default())),
    }
}

/// A call recorded by [`MockConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Host the call went to.
    pub host: String,
    /// The call itself.
    pub command: NodeCommand,
}

#[derive(Debug, Default)]
struct MockState {
    unreachable: HashSet<String>,
    failing: HashSet<String>,
    latency: Duration,
    host_latency: HashMap<String, Duration>,
    calls: Mutex<Vec<RecordedCall>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

/// Mock connector for testing.
///
/// Every host accepts every command unless configured otherwise. Calls and
/// connection counts are recorded for assertions.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    /// Create a connector where every host succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse connections to `host`.
    #[must_use]
    pub fn with_unreachable_host(self, host: &str) -> Self {
        self.configure(|state| {
            state.unreachable.insert(host.to_owned());
        })
    }

    /// Accept connections to `host` but fail every command with a remote error.
    #[must_use]
    pub fn with_failing_host(self, host: &str) -> Self {
        self.configure(|state| {
            state.failing.insert(host.to_owned());
        })
    }

    /// Delay every command by `latency`.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.configure(|state| state.latency = latency)
    }

    /// Delay commands to one host by `latency`.
    #[must_use]
    pub fn with_host_latency(self, host: &str, latency: Duration) -> Self {
        self.configure(|state| {
            state.host_latency.insert(host.to_owned(), latency);
        })
    }

    /// Every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state
            .calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Hosts that received at least one call.
    #[must_use]
    pub fn called_hosts(&self) -> BTreeSet<String> {
        self.calls().into_iter().map(|c| c.host).collect()
    }

    /// Number of successful connects.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Number of disconnects.
    #[must_use]
    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    fn configure(self, f: impl FnOnce(&mut MockState)) -> Self {
        let mut state = Arc::try_unwrap(self.state).unwrap_or_else(|shared| MockState {
            unreachable: shared.unreachable.clone(),
            failing: shared.failing.clone(),
            latency: shared.latency,
            host_latency: shared.host_latency.clone(),
            ..MockState::default()
        });
        f(&mut state);
        Self {
            state: Arc::new(state),
        }
    }
}

#[async_trait]
impl NodeConnector for MockConnector {
    async fn connect(&self, host: &str) -> ControlResult<Box<dyn NodeHandle>> {
        if self.state.unreachable.contains(host) {
            return Err(ControlError::node(host, "connection refused"));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockHandle {
            host: host.to_owned(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockHandle {
    host: String,
    state: Arc<MockState>,
}

impl MockHandle {
    async fn call(&self, command: NodeCommand) -> ControlResult<()> {
        let latency = self
            .state
            .host_latency
            .get(&self.host)
            .copied()
            .unwrap_or(self.state.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Ok(mut calls) = self.state.calls.lock() {
            calls.push(RecordedCall {
                host: self.host.clone(),
                command,
            });
        }

        if self.state.failing.contains(&self.host) {
            return Err(ControlError::node(&self.host, "remote error"));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeHandle for MockHandle {
    async fn start_app(&self, app_id: &str, profile: &str) -> ControlResult<()> {
        self.call(NodeCommand::Start {
            app_id: app_id.to_owned(),
            profile: profile.to_owned(),
        })
        .await
    }

    async fn stop_app(&self, app_id: &str) -> ControlResult<()> {
        self.call(NodeCommand::Stop {
            app_id: app_id.to_owned(),
        })
        .await
    }

    async fn info(&self, app_id: &str) -> ControlResult<Value> {
        self.call(NodeCommand::Info {
            app_id: app_id.to_owned(),
        })
        .await?;
        Ok(serde_json::json!({ "app": app_id, "host": self.host, "state": "running" }))
    }

    async fn refresh_group(&self, name: &str, group: &RoutingGroup) -> ControlResult<()> {
        self.call(NodeCommand::RefreshGroup {
            name: name.to_owned(),
            group: group.clone(),
        })
        .await
    }

    async fn disconnect(&self) {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}
