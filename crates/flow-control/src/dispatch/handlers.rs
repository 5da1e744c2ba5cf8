//! The worker's command table.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::Value;

use crate::config::DeploymentConfig;
use crate::deployment::{
    AppRequest, DeployRequest, DeploymentOrchestrator, RefreshRequest, StartRequest,
};
use crate::entities::{
    Crashlogs, DeployLogs, HostDirectory, Profiles, RoutingGroups, Runlists, StoredHosts,
};
use crate::error::ControlResult;
use crate::fleet::FleetCoordinator;
use crate::node::NodeConnector;
use crate::response::ResponseStream;
use crate::store::KeyValueStore;
use crate::types::{AppId, Host};

use super::Dispatcher;

/// Everything a command handler can reach.
pub struct Services {
    /// Execution profiles.
    pub profiles: Profiles,
    /// Run-lists.
    pub runlists: Runlists,
    /// Routing groups.
    pub groups: RoutingGroups,
    /// Stored host list, for `host-add` and `host-remove`.
    pub stored_hosts: StoredHosts,
    /// Host directory used for listing and fan-out.
    pub hosts: Arc<dyn HostDirectory>,
    /// Crash logs.
    pub crashlogs: Crashlogs,
    /// Deploy transcripts.
    pub deploy_logs: DeployLogs,
    /// Fleet operations.
    pub orchestrator: DeploymentOrchestrator,
}

impl Services {
    /// Wire every repository over `store` and the orchestrator over `hosts`.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        hosts: Arc<dyn HostDirectory>,
        connector: Arc<dyn NodeConnector>,
        coordinator: FleetCoordinator,
        config: DeploymentConfig,
    ) -> Self {
        let groups = RoutingGroups::new(Arc::clone(&store));
        let runlists = Runlists::new(Arc::clone(&store));
        let deploy_logs = DeployLogs::new(Arc::clone(&store));
        let orchestrator = DeploymentOrchestrator::new(
            groups.clone(),
            runlists.clone(),
            Arc::clone(&hosts),
            connector,
            coordinator,
            deploy_logs.clone(),
            config,
        );

        Self {
            profiles: Profiles::new(Arc::clone(&store)),
            runlists,
            groups,
            stored_hosts: StoredHosts::new(Arc::clone(&store)),
            hosts,
            crashlogs: Crashlogs::new(store),
            deploy_logs,
            orchestrator,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

/// Build the dispatcher with every worker command.
pub fn register(services: Arc<Services>) -> Dispatcher {
    Dispatcher::builder(services)
        .unary("profile-read", profile_read)
        .unary("profile-list", profile_list)
        .unary("profile-remove", profile_remove)
        .unary("profile-upload", profile_upload)
        .unary("runlist-read", runlist_read)
        .unary("runlist-list", runlist_list)
        .unary("runlist-remove", runlist_remove)
        .unary("runlist-add-app", runlist_add_app)
        .unary("host-list", host_list)
        .unary("host-add", host_add)
        .unary("host-remove", host_remove)
        .unary("group-list", group_list)
        .unary("group-create", group_create)
        .unary("group-read", group_read)
        .unary("group-remove", group_remove)
        .unary("group-pushapp", group_pushapp)
        .unary("group-popapp", group_popapp)
        .route("group-refresh", group_refresh)
        .unary("crashlog-list", crashlog_list)
        .route("crashlog-view", crashlog_view)
        .route("app-deploy", app_deploy)
        .route("app-start", app_start)
        .route("app-stop", app_stop)
        .unary("app-info", app_info)
        .unary("deploylog-list", deploylog_list)
        .route("deploylog-read", deploylog_read)
        .build()
}

#[derive(Debug, Deserialize)]
struct ProfileUpload {
    #[serde(rename = "profilename")]
    name: String,
    profile: Value,
}

#[derive(Debug, Deserialize)]
struct RunlistAddApp {
    name: String,
    app: String,
    profile: String,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
struct GroupPushApp {
    name: String,
    app: String,
    weight: u32,
}

#[derive(Debug, Deserialize)]
struct GroupPopApp {
    name: String,
    app: String,
}

/// Crash log timestamps arrive either as the listed string or as a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Text(String),
    Number(u64),
}

impl Timestamp {
    fn into_key(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CrashlogView {
    name: String,
    timestamp: Timestamp,
}

// Profiles

async fn profile_read(services: Arc<Services>, name: String) -> ControlResult<Value> {
    services.profiles.view(&name).await
}

async fn profile_list(services: Arc<Services>, _: IgnoredAny) -> ControlResult<Vec<String>> {
    services.profiles.list().await
}

async fn profile_remove(services: Arc<Services>, name: String) -> ControlResult<()> {
    services.profiles.remove(&name).await
}

async fn profile_upload(services: Arc<Services>, req: ProfileUpload) -> ControlResult<()> {
    services.profiles.upload(&req.name, &req.profile).await
}

// Run-lists

async fn runlist_read(
    services: Arc<Services>,
    name: String,
) -> ControlResult<BTreeMap<String, String>> {
    Ok(services.runlists.view(&name).await?.entries)
}

async fn runlist_list(services: Arc<Services>, _: IgnoredAny) -> ControlResult<Vec<String>> {
    services.runlists.list().await
}

async fn runlist_remove(services: Arc<Services>, name: String) -> ControlResult<()> {
    services.runlists.remove(&name).await
}

async fn runlist_add_app(services: Arc<Services>, req: RunlistAddApp) -> ControlResult<()> {
    let app: AppId = req.app.parse()?;
    services
        .runlists
        .add_application(&req.name, &app, &req.profile, req.force)
        .await
}

// Hosts

async fn host_list(services: Arc<Services>, _: IgnoredAny) -> ControlResult<BTreeSet<Host>> {
    services.hosts.hosts().await
}

async fn host_add(services: Arc<Services>, host: String) -> ControlResult<()> {
    services.stored_hosts.add(&host).await
}

async fn host_remove(services: Arc<Services>, host: String) -> ControlResult<()> {
    services.stored_hosts.remove(&host).await
}

// Routing groups

async fn group_list(services: Arc<Services>, _: IgnoredAny) -> ControlResult<Vec<String>> {
    services.groups.list().await
}

async fn group_create(services: Arc<Services>, name: String) -> ControlResult<()> {
    services.groups.create(&name).await.map(drop)
}

async fn group_read(
    services: Arc<Services>,
    name: String,
) -> ControlResult<BTreeMap<String, u32>> {
    Ok(services.groups.view(&name).await?.members)
}

async fn group_remove(services: Arc<Services>, name: String) -> ControlResult<()> {
    services.groups.remove(&name).await
}

async fn group_pushapp(services: Arc<Services>, req: GroupPushApp) -> ControlResult<()> {
    let app: AppId = req.app.parse()?;
    services
        .groups
        .add_application(&req.name, &app, req.weight)
        .await
}

async fn group_popapp(services: Arc<Services>, req: GroupPopApp) -> ControlResult<()> {
    services.groups.remove_application(&req.name, &req.app).await
}

async fn group_refresh(
    services: Arc<Services>,
    name: RefreshRequest,
    response: ResponseStream,
) -> ControlResult<()> {
    let outcome = services
        .orchestrator
        .refresh_groups(name.as_deref(), &response)
        .await?;
    response.write_json(&outcome)
}

// Crash logs

async fn crashlog_list(services: Arc<Services>, app: String) -> ControlResult<Vec<String>> {
    services.crashlogs.list(&app).await
}

async fn crashlog_view(
    services: Arc<Services>,
    req: CrashlogView,
    response: ResponseStream,
) -> ControlResult<()> {
    let content = services
        .crashlogs
        .view(&req.name, &req.timestamp.into_key())
        .await?;
    response.write(content)
}

// Applications

async fn app_deploy(
    services: Arc<Services>,
    req: DeployRequest,
    response: ResponseStream,
) -> ControlResult<()> {
    services.orchestrator.deploy(&req, &response).await.map(drop)
}

async fn app_start(
    services: Arc<Services>,
    req: StartRequest,
    response: ResponseStream,
) -> ControlResult<()> {
    services.orchestrator.start(&req, &response).await.map(drop)
}

async fn app_stop(
    services: Arc<Services>,
    req: AppRequest,
    response: ResponseStream,
) -> ControlResult<()> {
    services.orchestrator.stop(&req, &response).await.map(drop)
}

async fn app_info(
    services: Arc<Services>,
    req: AppRequest,
) -> ControlResult<BTreeMap<Host, Value>> {
    services.orchestrator.info(&req).await
}

// Deploy logs

async fn deploylog_list(services: Arc<Services>, _: IgnoredAny) -> ControlResult<Vec<String>> {
    services.deploy_logs.list().await
}

async fn deploylog_read(
    services: Arc<Services>,
    key: String,
    response: ResponseStream,
) -> ControlResult<()> {
    let transcript = services.deploy_logs.read(&key).await?;
    response.write(transcript)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::node::MockConnector;
    use crate::store::{namespaces, MemoryStore};

    fn dispatcher() -> Dispatcher {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let hosts: Arc<dyn HostDirectory> = Arc::new(StoredHosts::new(Arc::clone(&store)));
        let services = Services::new(
            store,
            hosts,
            Arc::new(MockConnector::new()),
            FleetCoordinator::default(),
            DeploymentConfig::default(),
        );
        register(Arc::new(services))
    }

    #[tokio::test]
    async fn profile_upload_then_read() {
        let dispatcher = dispatcher();
        let upload = dispatcher
            .dispatch(
                "profile-upload",
                r#"{"profilename": "prod", "profile": {"isolate": "docker"}}"#,
            )
            .collect()
            .await;
        assert!(upload.error.is_none(), "{:?}", upload.error);

        let read = dispatcher.dispatch("profile-read", r#""prod""#).collect().await;
        let profile: Value = read.last_json().unwrap();
        assert_eq!(profile["isolate"], "docker");

        let list = dispatcher.dispatch("profile-list", "").collect().await;
        assert_eq!(list.last_json::<Vec<String>>().unwrap(), vec!["prod"]);
    }

    #[tokio::test]
    async fn missing_profile_is_not_found() {
        let response = dispatcher()
            .dispatch("profile-read", r#""ghost""#)
            .collect()
            .await;
        assert_eq!(response.error.unwrap().0, codes::NOT_FOUND);
        assert!(response.closed);
    }

    #[tokio::test]
    async fn group_push_and_pop() {
        let dispatcher = dispatcher();
        dispatcher.dispatch("group-create", r#""web""#).collect().await;
        dispatcher
            .dispatch("group-pushapp", r#"{"name": "web", "app": "web_3", "weight": 7}"#)
            .collect()
            .await;

        let read = dispatcher.dispatch("group-read", r#""web""#).collect().await;
        let members: BTreeMap<String, u32> = read.last_json().unwrap();
        assert_eq!(members["web_3"], 7);

        dispatcher
            .dispatch("group-popapp", r#"{"name": "web", "app": "web_3"}"#)
            .collect()
            .await;
        let read = dispatcher.dispatch("group-read", r#""web""#).collect().await;
        assert!(read.last_json::<BTreeMap<String, u32>>().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pushapp_rejects_bad_app_id() {
        let dispatcher = dispatcher();
        let response = dispatcher
            .dispatch("group-pushapp", r#"{"name": "web", "app": "noversion", "weight": 1}"#)
            .collect()
            .await;
        assert_eq!(response.error.unwrap().0, codes::VALIDATION);

        let read = dispatcher.dispatch("group-read", r#""web""#).collect().await;
        assert_eq!(read.error.unwrap().0, codes::NOT_FOUND);
    }

    #[tokio::test]
    async fn runlist_add_app_rejects_empty_version() {
        let response = dispatcher()
            .dispatch(
                "runlist-add-app",
                r#"{"name": "main", "app": "web_", "profile": "prod"}"#,
            )
            .collect()
            .await;
        assert_eq!(response.error.unwrap().0, codes::VALIDATION);
        assert!(response.closed);
    }

    #[tokio::test]
    async fn pushapp_with_wrong_field_type_is_decode_error() {
        let response = dispatcher()
            .dispatch("group-pushapp", r#"{"name": "web", "app": 3, "weight": 1}"#)
            .collect()
            .await;
        assert_eq!(response.error.unwrap().0, codes::DECODE);
    }

    #[tokio::test]
    async fn runlist_add_app_without_force_conflicts() {
        let dispatcher = dispatcher();
        let first = dispatcher
            .dispatch(
                "runlist-add-app",
                r#"{"name": "main", "app": "web_3", "profile": "prod"}"#,
            )
            .collect()
            .await;
        assert!(first.error.is_none());

        let second = dispatcher
            .dispatch(
                "runlist-add-app",
                r#"{"name": "main", "app": "web_3", "profile": "staging"}"#,
            )
            .collect()
            .await;
        assert_eq!(second.error.unwrap().0, codes::VALIDATION);

        let forced = dispatcher
            .dispatch(
                "runlist-add-app",
                r#"{"name": "main", "app": "web_3", "profile": "staging", "force": true}"#,
            )
            .collect()
            .await;
        assert!(forced.error.is_none());
    }

    #[tokio::test]
    async fn hosts_round_trip() {
        let dispatcher = dispatcher();
        dispatcher.dispatch("host-add", r#""h1""#).collect().await;
        dispatcher.dispatch("host-add", r#""h2""#).collect().await;
        dispatcher.dispatch("host-remove", r#""h1""#).collect().await;

        let list = dispatcher.dispatch("host-list", "null").collect().await;
        assert_eq!(list.last_json::<Vec<String>>().unwrap(), vec!["h2"]);
    }

    #[tokio::test]
    async fn deploy_streams_progress_and_outcome() {
        let dispatcher = dispatcher();
        dispatcher.dispatch("host-add", r#""h1""#).collect().await;

        let response = dispatcher
            .dispatch(
                "app-deploy",
                r#"{"appname": "web", "version": "3", "profile": "prod", "runlist": "main"}"#,
            )
            .collect()
            .await;

        assert!(response.error.is_none(), "{:?}", response.error);
        assert!(response.text().contains("Done 1/0"));
        let outcome: crate::types::FleetOutcome = response.last_json().unwrap();
        assert_eq!(outcome.succeeded.len(), 1);

        let logs = dispatcher.dispatch("deploylog-list", "").collect().await;
        let keys: Vec<String> = logs.last_json().unwrap();
        assert_eq!(keys.len(), 1);

        let transcript = dispatcher
            .dispatch("deploylog-read", serde_json::to_vec(&keys[0]).unwrap())
            .collect()
            .await;
        assert!(transcript.text().contains("Done 1/0"));
    }

    #[tokio::test]
    async fn deploy_missing_argument_is_decode_error() {
        let response = dispatcher()
            .dispatch("app-deploy", r#"{"appname": "web", "version": "3"}"#)
            .collect()
            .await;
        assert_eq!(response.error.unwrap().0, codes::DECODE);
    }

    #[tokio::test]
    async fn crashlog_view_accepts_numeric_timestamp() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store
            .write(namespaces::CRASHLOGS, "web_3:1700000000", b"segfault")
            .await
            .unwrap();
        let hosts: Arc<dyn HostDirectory> = Arc::new(StoredHosts::new(Arc::clone(&store)));
        let dispatcher = register(Arc::new(Services::new(
            store,
            hosts,
            Arc::new(MockConnector::new()),
            FleetCoordinator::default(),
            DeploymentConfig::default(),
        )));

        let response = dispatcher
            .dispatch("crashlog-view", r#"{"name": "web_3", "timestamp": 1700000000}"#)
            .collect()
            .await;
        assert_eq!(response.text(), "segfault");
    }
}
