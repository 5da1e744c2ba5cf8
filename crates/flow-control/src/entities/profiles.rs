//! Execution profile repository. Profile bodies are opaque JSON.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{ControlError, ControlResult};
use crate::store::{namespaces, read_json, write_json, KeyValueStore};

const KIND: &str = "profile";

/// Profiles stored under [`namespaces::PROFILES`].
#[derive(Clone)]
pub struct Profiles {
    store: Arc<dyn KeyValueStore>,
}

impl Profiles {
    /// Create a repository over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Names of every profile.
    pub async fn list(&self) -> ControlResult<Vec<String>> {
        self.store.list(namespaces::PROFILES).await
    }

    /// Read a profile body.
    pub async fn view(&self, name: &str) -> ControlResult<Value> {
        read_json(self.store.as_ref(), namespaces::PROFILES, name)
            .await?
            .ok_or_else(|| ControlError::not_found(KIND, name))
    }

    /// Store a profile body, replacing any existing one.
    pub async fn upload(&self, name: &str, body: &Value) -> ControlResult<()> {
        if name.is_empty() {
            return Err(ControlError::validation("profile name is empty"));
        }
        if !body.is_object() {
            return Err(ControlError::validation(format!(
                "profile {name} must be a JSON object"
            )));
        }
        write_json(self.store.as_ref(), namespaces::PROFILES, name, body).await
    }

    /// Remove a profile.
    pub async fn remove(&self, name: &str) -> ControlResult<()> {
        if self.store.read(namespaces::PROFILES, name).await?.is_none() {
            return Err(ControlError::not_found(KIND, name));
        }
        self.store.remove(namespaces::PROFILES, name).await
    }
}

impl std::fmt::Debug for Profiles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profiles").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn upload_view_remove() {
        let profiles = Profiles::new(Arc::new(MemoryStore::new()));
        let body = json!({"isolate": {"type": "process"}, "pool-limit": 4});

        profiles.upload("default", &body).await.unwrap();
        assert_eq!(profiles.view("default").await.unwrap(), body);
        assert_eq!(profiles.list().await.unwrap(), vec!["default"]);

        profiles.remove("default").await.unwrap();
        assert!(profiles.view("default").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn rejects_non_object_body() {
        let profiles = Profiles::new(Arc::new(MemoryStore::new()));
        let err = profiles.upload("bad", &json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, ControlError::Validation(_)));
    }
}
