//! Key/value storage backends.
//!
//! Every entity (routing groups, run-lists, profiles, hosts, crashlogs and
//! deploy logs) lives in its own namespace of a shared [`KeyValueStore`].
//! Only an in-memory backend ships with the worker; durable backends plug in
//! behind the same trait.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ControlResult;

/// Namespaces used by the worker.
pub mod namespaces {
    /// Execution profiles.
    pub const PROFILES: &str = "profiles";
    /// Run-lists.
    pub const RUNLISTS: &str = "runlists";
    /// Routing groups.
    pub const GROUPS: &str = "groups";
    /// Fleet host addresses.
    pub const HOSTS: &str = "flow_hosts";
    /// Application crash logs.
    pub const CRASHLOGS: &str = "crashlogs";
    /// Deploy/start/stop transcripts.
    pub const DEPLOY_LOGS: &str = "flow_deploy_logs";
}

/// Backend for namespaced key/value storage.
///
/// Implementations are shared between concurrent commands and must tolerate
/// concurrent mutation; no exclusive access is assumed by callers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    ///
    /// Returns `None` if the key does not exist.
    async fn read(&self, namespace: &str, key: &str) -> ControlResult<Option<Vec<u8>>>;

    /// Write a value, replacing any previous one.
    async fn write(&self, namespace: &str, key: &str, value: &[u8]) -> ControlResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, namespace: &str, key: &str) -> ControlResult<()>;

    /// List the keys of a namespace in ascending order.
    async fn list(&self, namespace: &str) -> ControlResult<Vec<String>>;
}

/// Read and decode a JSON value.
pub async fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    namespace: &str,
    key: &str,
) -> ControlResult<Option<T>> {
    match store.read(namespace, key).await? {
        Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        None => Ok(None),
    }
}

/// Encode a value as JSON and write it.
pub async fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    namespace: &str,
    key: &str,
    value: &T,
) -> ControlResult<()> {
    let raw = serde_json::to_vec(value)?;
    store.write(namespace, key, &raw).await
}
