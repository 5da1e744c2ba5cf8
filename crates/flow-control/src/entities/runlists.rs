//! Run-list repository.

use std::sync::Arc;

use tracing::debug;

use crate::error::{ControlError, ControlResult};
use crate::store::{namespaces, read_json, write_json, KeyValueStore};
use crate::types::{AppId, Runlist};

const KIND: &str = "runlist";

/// Run-lists stored under [`namespaces::RUNLISTS`].
#[derive(Clone)]
pub struct Runlists {
    store: Arc<dyn KeyValueStore>,
}

impl Runlists {
    /// Create a repository over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Names of every run-list.
    pub async fn list(&self) -> ControlResult<Vec<String>> {
        self.store.list(namespaces::RUNLISTS).await
    }

    /// Read a run-list.
    pub async fn view(&self, name: &str) -> ControlResult<Runlist> {
        read_json(self.store.as_ref(), namespaces::RUNLISTS, name)
            .await?
            .ok_or_else(|| ControlError::not_found(KIND, name))
    }

    /// Remove a run-list.
    pub async fn remove(&self, name: &str) -> ControlResult<()> {
        if self.store.read(namespaces::RUNLISTS, name).await?.is_none() {
            return Err(ControlError::not_found(KIND, name));
        }
        self.store.remove(namespaces::RUNLISTS, name).await
    }

    /// Record `app_id` against `profile` in run-list `name`.
    ///
    /// A missing run-list is created. With `force`, any earlier assignment is
    /// replaced; without it, a conflicting assignment is rejected.
    pub async fn add_application(
        &self,
        name: &str,
        app_id: &AppId,
        profile: &str,
        force: bool,
    ) -> ControlResult<()> {
        let mut runlist = match self.view(name).await {
            Ok(runlist) => runlist,
            Err(e) if e.is_not_found() => {
                debug!(runlist = %name, "creating runlist");
                Runlist::default()
            }
            Err(e) => return Err(e),
        };

        if !force {
            if let Some(existing) = runlist.entries.get(&app_id.to_string()) {
                if existing != profile {
                    return Err(ControlError::validation(format!(
                        "{app_id} already runs with profile {existing} in runlist {name}"
                    )));
                }
            }
        }

        let previous = runlist.assign(app_id, profile);
        debug!(
            runlist = %name,
            app_id = %app_id,
            profile = %profile,
            previous = ?previous,
            "assigning profile"
        );
        write_json(self.store.as_ref(), namespaces::RUNLISTS, name, &runlist).await
    }
}

impl std::fmt::Debug for Runlists {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runlists").finish_non_exhaustive()
    }
}
