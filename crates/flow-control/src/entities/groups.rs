//! Routing group repository.

use std::sync::Arc;

use tracing::debug;

use crate::error::{ControlError, ControlResult};
use crate::store::{namespaces, read_json, write_json, KeyValueStore};
use crate::types::{AppId, RoutingGroup};

const KIND: &str = "routing group";

/// Routing groups stored under [`namespaces::GROUPS`].
#[derive(Clone)]
pub struct RoutingGroups {
    store: Arc<dyn KeyValueStore>,
}

impl RoutingGroups {
    /// Create a repository over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Names of every routing group.
    pub async fn list(&self) -> ControlResult<Vec<String>> {
        self.store.list(namespaces::GROUPS).await
    }

    /// Read a group.
    pub async fn view(&self, name: &str) -> ControlResult<RoutingGroup> {
        self.get(name)
            .await?
            .ok_or_else(|| ControlError::not_found(KIND, name))
    }

    /// Create an empty group unless one already exists.
    ///
    /// Returns `true` if the group was created.
    pub async fn create(&self, name: &str) -> ControlResult<bool> {
        if self.get(name).await?.is_some() {
            return Ok(false);
        }
        debug!(group = %name, "creating routing group");
        self.put(name, &RoutingGroup::default()).await?;
        Ok(true)
    }

    /// Remove a group.
    pub async fn remove(&self, name: &str) -> ControlResult<()> {
        if self.get(name).await?.is_none() {
            return Err(ControlError::not_found(KIND, name));
        }
        self.store.remove(namespaces::GROUPS, name).await
    }

    /// Insert or replace `app_id` in `group` with `weight`.
    ///
    /// A missing group is created.
    pub async fn add_application(
        &self,
        group: &str,
        app_id: &AppId,
        weight: u32,
    ) -> ControlResult<()> {
        let mut content = self.get(group).await?.unwrap_or_default();
        let previous = content.upsert(app_id, weight);
        debug!(
            group = %group,
            app_id = %app_id,
            weight,
            previous = ?previous,
            "upserting group member"
        );
        self.put(group, &content).await
    }

    /// Remove `app_id` from `group`. Removing an absent member is a no-op.
    pub async fn remove_application(&self, group: &str, app_id: &str) -> ControlResult<()> {
        let mut content = self.view(group).await?;
        if content.remove(app_id).is_none() {
            debug!(group = %group, app_id = %app_id, "member already absent");
            return Ok(());
        }
        self.put(group, &content).await
    }

    async fn get(&self, name: &str) -> ControlResult<Option<RoutingGroup>> {
        read_json(self.store.as_ref(), namespaces::GROUPS, name).await
    }

    async fn put(&self, name: &str, group: &RoutingGroup) -> ControlResult<()> {
        write_json(self.store.as_ref(), namespaces::GROUPS, name, group).await
    }
}

impl std::fmt::Debug for RoutingGroups {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingGroups").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn groups() -> RoutingGroups {
        RoutingGroups::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let groups = groups();
        let id = AppId::new("web", "1").unwrap();

        assert!(groups.create("web").await.unwrap());
        groups.add_application("web", &id, 3).await.unwrap();
        assert!(!groups.create("web").await.unwrap());

        let content = groups.view("web").await.unwrap();
        assert_eq!(content.members["web_1"], 3);
    }

    #[tokio::test]
    async fn add_application_creates_missing_group() {
        let groups = groups();
        let id = AppId::new("api", "2").unwrap();
        groups.add_application("api", &id, 7).await.unwrap();
        assert_eq!(groups.list().await.unwrap(), vec!["api"]);
    }

    #[tokio::test]
    async fn remove_absent_member_is_noop() {
        let groups = groups();
        groups.create("web").await.unwrap();
        groups.remove_application("web", "web_9").await.unwrap();
        assert!(groups.view("web").await.unwrap().members.is_empty());
    }

    #[tokio::test]
    async fn remove_member() {
        let groups = groups();
        let id = AppId::new("web", "1").unwrap();
        groups.add_application("web", &id, 1).await.unwrap();
        groups.remove_application("web", "web_1").await.unwrap();
        assert!(groups.view("web").await.unwrap().members.is_empty());
    }

    #[tokio::test]
    async fn missing_group_is_not_found() {
        let groups = groups();
        assert!(groups.view("nope").await.unwrap_err().is_not_found());
        assert!(groups.remove("nope").await.unwrap_err().is_not_found());
        assert!(groups
            .remove_application("nope", "x_1")
            .await
            .unwrap_err()
            .is_not_found());
    }
}
