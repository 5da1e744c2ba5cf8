//! Test fixtures for flow-control integration tests.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flow_control::entities::HostDirectory;
use flow_control::{ControlError, ControlResult, Host, KeyValueStore, MemoryStore};

/// Store that fails writes to chosen namespaces on demand.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<String>>,
    writes: Mutex<Vec<(String, String)>>,
}

impl FlakyStore {
    /// Creates a store where every operation succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write to `namespace` fail.
    pub fn fail_writes_to(&self, namespace: &str) {
        self.failing.lock().unwrap().insert(namespace.to_string());
    }

    /// Every successful write as `(namespace, key)`.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn read(&self, namespace: &str, key: &str) -> ControlResult<Option<Vec<u8>>> {
        self.inner.read(namespace, key).await
    }

    async fn write(&self, namespace: &str, key: &str, value: &[u8]) -> ControlResult<()> {
        if self.failing.lock().unwrap().contains(namespace) {
            return Err(ControlError::store(format!("{namespace} is read-only")));
        }
        self.inner.write(namespace, key, value).await?;
        self.writes
            .lock()
            .unwrap()
            .push((namespace.to_string(), key.to_string()));
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &str) -> ControlResult<()> {
        self.inner.remove(namespace, key).await
    }

    async fn list(&self, namespace: &str) -> ControlResult<Vec<String>> {
        self.inner.list(namespace).await
    }
}

/// Host directory with a fixed host set that can be switched to failing.
#[derive(Default)]
pub struct StaticHosts {
    hosts: BTreeSet<Host>,
    broken: AtomicBool,
}

impl StaticHosts {
    /// Creates a directory that always returns `hosts`.
    pub fn new(hosts: &[&str]) -> Self {
        Self {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            broken: AtomicBool::new(false),
        }
    }

    /// Makes every lookup fail.
    pub fn break_lookups(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl HostDirectory for StaticHosts {
    async fn hosts(&self) -> ControlResult<BTreeSet<Host>> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(ControlError::HostDirectory("directory offline".to_string()));
        }
        Ok(self.hosts.clone())
    }
}

/// A deploy payload for `web` version `3`.
pub fn deploy_payload(profile: &str, runlist: &str, weight: u32) -> serde_json::Value {
    serde_json::json!({
        "appname": "web",
        "version": "3",
        "profile": profile,
        "runlist": runlist,
        "weight": weight,
    })
}

/// Shared handle to a [`StaticHosts`] usable as a host directory.
pub fn static_hosts(hosts: &[&str]) -> Arc<StaticHosts> {
    Arc::new(StaticHosts::new(hosts))
}
