//! In-memory key/value store.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{ControlError, ControlResult};

use super::KeyValueStore;

/// In-memory key/value store.
///
/// Data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn read(&self, namespace: &str, key: &str) -> ControlResult<Option<Vec<u8>>> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|_| ControlError::store("lock poisoned"))?;

        Ok(namespaces
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn write(&self, namespace: &str, key: &str, value: &[u8]) -> ControlResult<()> {
        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|_| ControlError::store("lock poisoned"))?;

        namespaces
            .entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &str) -> ControlResult<()> {
        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|_| ControlError::store("lock poisoned"))?;

        if let Some(entries) = namespaces.get_mut(namespace) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn list(&self, namespace: &str) -> ControlResult<Vec<String>> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|_| ControlError::store("lock poisoned"))?;

        Ok(namespaces
            .get(namespace)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{read_json, write_json};

    #[tokio::test]
    async fn write_read_remove() {
        let store = MemoryStore::new();
        store.write("ns", "a", b"1").await.unwrap();

        assert_eq!(store.read("ns", "a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.read("ns", "b").await.unwrap(), None);
        assert_eq!(store.read("other", "a").await.unwrap(), None);

        store.remove("ns", "a").await.unwrap();
        assert_eq!(store.read("ns", "a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_absent_key_is_noop() {
        let store = MemoryStore::new();
        store.remove("ns", "missing").await.unwrap();
    }

    #[tokio::test]
    async fn list_is_sorted_and_scoped() {
        let store = MemoryStore::new();
        store.write("ns", "b", b"").await.unwrap();
        store.write("ns", "a", b"").await.unwrap();
        store.write("other", "c", b"").await.unwrap();

        assert_eq!(store.list("ns").await.unwrap(), vec!["a", "b"]);
        assert!(store.list("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn json_helpers() {
        let store = MemoryStore::new();
        write_json(&store, "ns", "k", &vec![1, 2, 3]).await.unwrap();
        let value: Option<Vec<u32>> = read_json(&store, "ns", "k").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));

        store.write("ns", "bad", b"not json").await.unwrap();
        let err = read_json::<Vec<u32>>(&store, "ns", "bad").await.unwrap_err();
        assert!(matches!(err, ControlError::Serialization(_)));
    }
}
