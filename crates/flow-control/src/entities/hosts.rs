//! Fleet host directory.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ControlError, ControlResult};
use crate::store::{namespaces, KeyValueStore};
use crate::types::Host;

/// Source of truth for the current set of fleet hosts.
///
/// Every call returns a fresh snapshot; two calls within one command may
/// disagree.
#[async_trait]
pub trait HostDirectory: Send + Sync {
    /// Current host set.
    ///
    /// Failure to enumerate is reported as [`ControlError::HostDirectory`],
    /// never as an empty set.
    async fn hosts(&self) -> ControlResult<BTreeSet<Host>>;
}

/// Host directory kept in the key/value store under [`namespaces::HOSTS`].
#[derive(Clone)]
pub struct StoredHosts {
    store: Arc<dyn KeyValueStore>,
}

impl StoredHosts {
    /// Create a directory over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Add a host. Adding a known host is a no-op.
    pub async fn add(&self, host: &str) -> ControlResult<()> {
        let host = host.trim();
        if host.is_empty() {
            return Err(ControlError::validation("host address is empty"));
        }
        self.store
            .write(namespaces::HOSTS, host, host.as_bytes())
            .await
    }

    /// Remove a host.
    pub async fn remove(&self, host: &str) -> ControlResult<()> {
        self.store.remove(namespaces::HOSTS, host).await
    }
}

#[async_trait]
impl HostDirectory for StoredHosts {
    async fn hosts(&self) -> ControlResult<BTreeSet<Host>> {
        let keys = self
            .store
            .list(namespaces::HOSTS)
            .await
            .map_err(|e| ControlError::HostDirectory(e.to_string()))?;
        Ok(keys.into_iter().collect())
    }
}

impl std::fmt::Debug for StoredHosts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredHosts").finish_non_exhaustive()
    }
}
