//! Flow control worker binary.
//!
//! Runs the command worker for fleet deployments.

use tracing::info;
use tracing_subscriber::EnvFilter;

use flow_control::{ControlConfig, ControlService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("flow_control=info".parse()?),
        )
        .init();

    info!("flow control worker starting");

    // Load configuration
    let config = ControlConfig::load().unwrap_or_else(|e| {
        info!(error = %e, "failed to load config, using defaults");
        ControlConfig::default()
    });

    info!(
        listen_addr = %config.server.listen_addr,
        connector_type = ?config.node.connector_type,
        node_port = config.node.port,
        "configuration loaded"
    );

    ControlService::new(config).run().await?;

    Ok(())
}
