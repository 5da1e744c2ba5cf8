//! Common test utilities for flow-control integration tests.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;

use flow_control::config::DeploymentConfig;
use flow_control::dispatch::{register, Services};
use flow_control::entities::{HostDirectory, StoredHosts};
use flow_control::response::CollectedResponse;
use flow_control::{Dispatcher, FleetCoordinator, KeyValueStore, MemoryStore, MockConnector};

/// Complete test worker with all components wired together.
pub struct TestWorker {
    pub store: Arc<dyn KeyValueStore>,
    pub connector: MockConnector,
    pub dispatcher: Dispatcher,
}

impl TestWorker {
    /// Creates a worker over an empty in-memory store where every host succeeds.
    pub fn new() -> Self {
        Self::with_connector(MockConnector::new())
    }

    /// Creates a worker whose hosts behave as `connector` says.
    pub fn with_connector(connector: MockConnector) -> Self {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let hosts: Arc<dyn HostDirectory> = Arc::new(StoredHosts::new(store.clone()));
        Self::build(store, hosts, connector)
    }

    /// Creates a worker over a custom store and host directory.
    pub fn build(
        store: Arc<dyn KeyValueStore>,
        hosts: Arc<dyn HostDirectory>,
        connector: MockConnector,
    ) -> Self {
        let services = Services::new(
            store.clone(),
            hosts,
            Arc::new(connector.clone()),
            FleetCoordinator::default(),
            DeploymentConfig::default(),
        );

        Self {
            store,
            connector,
            dispatcher: register(Arc::new(services)),
        }
    }

    /// Registers hosts through the `host-add` command.
    pub async fn add_hosts(&self, hosts: &[&str]) {
        for host in hosts {
            let response = self.run("host-add", serde_json::json!(host)).await;
            assert!(response.error.is_none(), "host-add {host}: {:?}", response.error);
        }
    }

    /// Runs a command with a JSON payload and drains its response.
    pub async fn run(&self, command: &str, payload: serde_json::Value) -> CollectedResponse {
        let payload = serde_json::to_vec(&payload).unwrap();
        self.dispatcher.dispatch(command, payload).collect().await
    }

    /// Runs a command and decodes its last chunk.
    pub async fn query<T: serde::de::DeserializeOwned>(
        &self,
        command: &str,
        payload: serde_json::Value,
    ) -> T {
        let response = self.run(command, payload).await;
        assert!(response.error.is_none(), "{command}: {:?}", response.error);
        response.last_json().unwrap()
    }
}
