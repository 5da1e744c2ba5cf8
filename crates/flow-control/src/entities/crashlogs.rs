//! Application crash logs, keyed `<app>:<timestamp>`.

use std::sync::Arc;

use crate::error::{ControlError, ControlResult};
use crate::store::{namespaces, KeyValueStore};

const KIND: &str = "crashlog";

/// Crash logs stored under [`namespaces::CRASHLOGS`].
#[derive(Clone)]
pub struct Crashlogs {
    store: Arc<dyn KeyValueStore>,
}

impl Crashlogs {
    /// Create a repository over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Timestamps of every crash log recorded for `app`, oldest first.
    pub async fn list(&self, app: &str) -> ControlResult<Vec<String>> {
        let prefix = format!("{app}:");
        let mut timestamps: Vec<String> = self
            .store
            .list(namespaces::CRASHLOGS)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(ToOwned::to_owned))
            .collect();
        timestamps.sort_by_key(|ts| ts.parse::<i64>().unwrap_or(i64::MAX));
        Ok(timestamps)
    }

    /// Read one crash log.
    pub async fn view(&self, app: &str, timestamp: &str) -> ControlResult<String> {
        let key = format!("{app}:{timestamp}");
        let raw = self
            .store
            .read(namespaces::CRASHLOGS, &key)
            .await?
            .ok_or_else(|| ControlError::not_found(KIND, &key))?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

impl std::fmt::Debug for Crashlogs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crashlogs").finish_non_exhaustive()
    }
}
