//! Service lifecycle management.
//!
//! Provides the main service runner with signal handling and graceful shutdown.

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api;
use crate::config::ControlConfig;
use crate::dispatch::{self, Dispatcher, Services};
use crate::entities::{HostDirectory, StoredHosts};
use crate::error::{ControlError, ControlResult};
use crate::fleet::FleetCoordinator;
use crate::node::{create_connector, NodeConnector};
use crate::store::{KeyValueStore, MemoryStore};

/// The flow worker service.
///
/// Manages the lifecycle of the worker, including:
/// - The shared store and host directory
/// - The node connector
/// - HTTP API server
/// - Signal handling and graceful shutdown
pub struct ControlService {
    config: ControlConfig,
    store: Arc<dyn KeyValueStore>,
    cancel: CancellationToken,
}

impl ControlService {
    /// Create a new service with an in-memory store.
    #[must_use]
    pub fn new(config: ControlConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Create a new service over an existing store.
    #[must_use]
    pub fn with_store(config: ControlConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            config,
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Build the command registry from configuration.
    pub fn dispatcher(&self) -> ControlResult<Dispatcher> {
        let connector = self.create_connector()?;
        let hosts: Arc<dyn HostDirectory> = Arc::new(StoredHosts::new(Arc::clone(&self.store)));
        let coordinator = FleetCoordinator::from_config(&self.config.fleet);
        info!(
            host_timeout_secs = self.config.fleet.host_timeout_secs,
            log_depth = self.config.deployment.log_depth,
            "fleet coordinator configured"
        );

        let services = Services::new(
            Arc::clone(&self.store),
            hosts,
            connector,
            coordinator,
            self.config.deployment.clone(),
        );
        let dispatcher = dispatch::register(Arc::new(services));
        info!(commands = dispatcher.commands().len(), "command registry initialised");
        Ok(dispatcher)
    }

    /// Run the worker.
    ///
    /// This will:
    /// 1. Create the node connector
    /// 2. Register every command
    /// 3. Start the HTTP API server
    /// 4. Wait for shutdown signal
    pub async fn run(&self) -> ControlResult<()> {
        let dispatcher = self.dispatcher()?;

        let state = api::AppState {
            dispatcher,
            store: Arc::clone(&self.store),
        };
        let app = api::router(state);

        let listener = tokio::net::TcpListener::bind(self.config.server.listen_addr)
            .await
            .map_err(|e| ControlError::Config(format!("failed to bind TCP: {e}")))?;

        info!(
            listen_addr = %self.config.server.listen_addr,
            "flow worker listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(self.cancel.clone()))
            .await
            .map_err(|e| ControlError::Config(format!("server error: {e}")))?;

        info!("flow worker shutdown complete");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn create_connector(&self) -> ControlResult<Arc<dyn NodeConnector>> {
        let connector = create_connector(&self.config.node)?;
        info!(
            connector_type = ?self.config.node.connector_type,
            port = self.config.node.port,
            "node connector configured"
        );
        Ok(connector)
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }
}
