//! Transcripts of deploy, start and stop commands.

use std::sync::Arc;

use crate::error::{ControlError, ControlResult};
use crate::store::{namespaces, KeyValueStore};

const KIND: &str = "deploy log";

/// Deploy logs stored under [`namespaces::DEPLOY_LOGS`] as `<app_id>:<operation id>`.
#[derive(Clone)]
pub struct DeployLogs {
    store: Arc<dyn KeyValueStore>,
}

impl DeployLogs {
    /// Create a repository over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Save a transcript and return its key.
    pub async fn save(
        &self,
        app_id: &str,
        operation_id: &str,
        transcript: &str,
    ) -> ControlResult<String> {
        let key = format!("{app_id}:{operation_id}");
        self.store
            .write(namespaces::DEPLOY_LOGS, &key, transcript.as_bytes())
            .await?;
        Ok(key)
    }

    /// Every saved key.
    pub async fn list(&self) -> ControlResult<Vec<String>> {
        self.store.list(namespaces::DEPLOY_LOGS).await
    }

    /// Read a saved transcript.
    pub async fn read(&self, key: &str) -> ControlResult<String> {
        let raw = self
            .store
            .read(namespaces::DEPLOY_LOGS, key)
            .await?
            .ok_or_else(|| ControlError::not_found(KIND, key))?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

impl std::fmt::Debug for DeployLogs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployLogs").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn save_and_read() {
        let logs = DeployLogs::new(Arc::new(MemoryStore::new()));
        let key = logs.save("web_3", "01j0", "line\n").await.unwrap();
        assert_eq!(key, "web_3:01j0");
        assert_eq!(logs.list().await.unwrap(), vec![key.clone()]);
        assert_eq!(logs.read(&key).await.unwrap(), "line\n");
        assert!(logs.read("web_3:nope").await.unwrap_err().is_not_found());
    }
}
