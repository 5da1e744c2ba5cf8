//! HTTP API for the flow worker.
//!
//! Provides endpoints for:
//! - Running worker commands with streamed responses
//! - Listing the command registry
//! - Health and readiness checks
//! - Prometheus metrics

mod commands;

use std::fmt::Write as _;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::dispatch::Dispatcher;
use crate::store::{namespaces, KeyValueStore};

pub use commands::{WireFrame, NDJSON};

/// Shared application state for the worker.
#[derive(Clone)]
pub struct AppState {
    /// Command registry.
    pub dispatcher: Dispatcher,
    /// Store for readiness checks and metrics.
    pub store: Arc<dyn KeyValueStore>,
}

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Commands
        .route("/commands", get(commands::list_commands))
        .route("/commands/{name}", post(commands::run_command))
        // Metrics
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse { status: "healthy" })
}

/// Readiness check endpoint.
async fn readiness_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> (axum::http::StatusCode, axum::Json<ReadyResponse>) {
    match state.store.list(namespaces::HOSTS).await {
        Ok(hosts) => (
            axum::http::StatusCode::OK,
            axum::Json(ReadyResponse {
                ready: true,
                hosts: hosts.len(),
            }),
        ),
        Err(_) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(ReadyResponse {
                ready: false,
                hosts: 0,
            }),
        ),
    }
}

/// Metrics endpoint.
async fn metrics(axum::extract::State(state): axum::extract::State<AppState>) -> String {
    let mut output = String::new();

    let entities = [
        ("groups", namespaces::GROUPS),
        ("runlists", namespaces::RUNLISTS),
        ("profiles", namespaces::PROFILES),
        ("hosts", namespaces::HOSTS),
    ];

    output.push_str("# HELP flow_entities_total Number of stored entities by kind\n");
    output.push_str("# TYPE flow_entities_total gauge\n");

    for (label, namespace) in entities {
        let count = state
            .store
            .list(namespace)
            .await
            .map(|keys| keys.len())
            .unwrap_or(0);
        let _ = writeln!(output, "flow_entities_total{{kind=\"{label}\"}} {count}");
    }

    let _ = writeln!(
        output,
        "# HELP flow_commands_registered Number of registered commands\n\
         # TYPE flow_commands_registered gauge\n\
         flow_commands_registered {}",
        state.dispatcher.commands().len()
    );

    output
}

/// Health response.
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Readiness response.
#[derive(serde::Serialize)]
struct ReadyResponse {
    ready: bool,
    hosts: usize,
}
