//! Multi-step deployment across the routing, run-list and host stores.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::DeploymentConfig;
use crate::entities::{DeployLogs, HostDirectory, RoutingGroups, Runlists};
use crate::error::{ControlError, ControlResult};
use crate::fleet::{FleetCoordinator, FleetReport};
use crate::log_buffer::LogBuffer;
use crate::node::{self, NodeCommand, NodeConnector};
use crate::response::ResponseStream;
use crate::types::{AppId, FleetOutcome, Host};

/// Payload of `app-deploy`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployRequest {
    /// Application name.
    #[serde(rename = "appname")]
    pub app: String,
    /// Application version.
    pub version: String,
    /// Profile to run with.
    pub profile: String,
    /// Run-list to record the application in.
    pub runlist: String,
    /// Routing weight.
    #[serde(default)]
    pub weight: u32,
}

/// Payload of `app-start`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    /// Application name.
    #[serde(rename = "appname")]
    pub app: String,
    /// Application version.
    pub version: String,
    /// Profile to run with.
    pub profile: String,
}

/// Payload of `app-stop` and `app-info`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppRequest {
    /// Application name.
    #[serde(rename = "appname")]
    pub app: String,
    /// Application version.
    pub version: String,
}

/// Payload of `group-refresh`: one group, or every group when absent.
pub type RefreshRequest = Option<String>;

/// Orchestrates deploy, start and stop across the fleet.
pub struct DeploymentOrchestrator {
    groups: RoutingGroups,
    runlists: Runlists,
    hosts: Arc<dyn HostDirectory>,
    connector: Arc<dyn NodeConnector>,
    coordinator: FleetCoordinator,
    deploy_logs: DeployLogs,
    config: DeploymentConfig,
}

impl DeploymentOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        groups: RoutingGroups,
        runlists: Runlists,
        hosts: Arc<dyn HostDirectory>,
        connector: Arc<dyn NodeConnector>,
        coordinator: FleetCoordinator,
        deploy_logs: DeployLogs,
        config: DeploymentConfig,
    ) -> Self {
        Self {
            groups,
            runlists,
            hosts,
            connector,
            coordinator,
            deploy_logs,
            config,
        }
    }

    /// Deploy an application version to the whole fleet.
    ///
    /// 1. Ensure a routing group named after the application exists
    /// 2. Upsert the version into it with the requested weight
    /// 3. Record the version against the profile in the run-list (overwriting)
    /// 4. Start the version on every host in the directory
    ///
    /// Any failure before the fan-out aborts the command. Individual host
    /// failures only show up in the returned outcome.
    pub async fn deploy(
        &self,
        request: &DeployRequest,
        response: &ResponseStream,
    ) -> ControlResult<FleetOutcome> {
        let app_id = AppId::new(&request.app, &request.version)?;
        require("profile", &request.profile)?;
        require("runlist", &request.runlist)?;

        info!(
            app_id = %app_id,
            profile = %request.profile,
            runlist = %request.runlist,
            weight = request.weight,
            "starting deployment"
        );

        let operation = self.begin(response, "Deploy", &app_id);
        let mut log = operation.log;
        let result = self.deploy_steps(&app_id, request, &mut log).await;
        self.finish(&app_id, &operation.id, log, result, response).await
    }

    async fn deploy_steps(
        &self,
        app_id: &AppId,
        request: &DeployRequest,
        log: &mut LogBuffer,
    ) -> ControlResult<FleetOutcome> {
        let group = app_id.name();

        let groups = self.groups.list().await?;
        if !groups.iter().any(|g| g == group) {
            info!(group = %group, "creating routing group");
            log.write(format_args!("Create routing group {group}"));
            self.groups.create(group).await?;
        }

        log.write(format_args!(
            "Add {app_id} to group {group} with weight {}",
            request.weight
        ));
        self.groups
            .add_application(group, app_id, request.weight)
            .await?;

        log.write(format_args!(
            "Add {app_id} to runlist {} with profile {}",
            request.runlist, request.profile
        ));
        self.runlists
            .add_application(&request.runlist, app_id, &request.profile, true)
            .await?;

        let command = NodeCommand::Start {
            app_id: app_id.to_string(),
            profile: request.profile.clone(),
        };
        self.fan_out(command, log)
            .await
            .map(|report| report.outcome())
    }

    /// Start an application version on every host.
    pub async fn start(
        &self,
        request: &StartRequest,
        response: &ResponseStream,
    ) -> ControlResult<FleetOutcome> {
        let app_id = AppId::new(&request.app, &request.version)?;
        require("profile", &request.profile)?;
        info!(app_id = %app_id, profile = %request.profile, "starting application");

        let operation = self.begin(response, "Start", &app_id);
        let mut log = operation.log;
        let command = NodeCommand::Start {
            app_id: app_id.to_string(),
            profile: request.profile.clone(),
        };
        let result = self
            .fan_out(command, &mut log)
            .await
            .map(|report| report.outcome());
        self.finish(&app_id, &operation.id, log, result, response).await
    }

    /// Stop an application version on every host.
    pub async fn stop(
        &self,
        request: &AppRequest,
        response: &ResponseStream,
    ) -> ControlResult<FleetOutcome> {
        let app_id = AppId::new(&request.app, &request.version)?;
        info!(app_id = %app_id, "stopping application");

        let operation = self.begin(response, "Stop", &app_id);
        let mut log = operation.log;
        let command = NodeCommand::Stop {
            app_id: app_id.to_string(),
        };
        let result = self
            .fan_out(command, &mut log)
            .await
            .map(|report| report.outcome());
        self.finish(&app_id, &operation.id, log, result, response).await
    }

    /// Collect runtime info for an application version from every host.
    ///
    /// Hosts that do not answer are left out of the result.
    pub async fn info(&self, request: &AppRequest) -> ControlResult<BTreeMap<Host, Value>> {
        let app_id = AppId::new(&request.app, &request.version)?;
        let mut log = LogBuffer::new(self.config.log_depth);
        let command = NodeCommand::Info {
            app_id: app_id.to_string(),
        };
        let report = self.fan_out(command, &mut log).await?;
        for (host, reason) in &report.failures {
            error!(app_id = %app_id, host = %host, error = %reason, "unable to read app info");
        }
        Ok(report.results)
    }

    /// Push routing group tables to every host.
    ///
    /// With a name, only that group is pushed; otherwise every group is.
    pub async fn refresh_groups(
        &self,
        name: Option<&str>,
        response: &ResponseStream,
    ) -> ControlResult<FleetOutcome> {
        let names = match name {
            Some(name) if !name.is_empty() => vec![name.to_owned()],
            _ => self.groups.list().await?,
        };

        let mut commands = Vec::with_capacity(names.len());
        for name in names {
            let group = self.groups.view(&name).await?;
            commands.push(NodeCommand::RefreshGroup { name, group });
        }

        info!(groups = commands.len(), "refreshing routing groups");

        let mut log = progress_log(self.config.log_depth, response);
        let hosts = self.hosts.hosts().await?;
        let connector = Arc::clone(&self.connector);
        let commands = Arc::new(commands);
        let report = self
            .coordinator
            .run(
                &hosts,
                move |host| {
                    let connector = Arc::clone(&connector);
                    let commands = Arc::clone(&commands);
                    async move { node::execute_all(connector.as_ref(), &host, &commands).await }
                },
                &mut log,
            )
            .await;

        let outcome = report.outcome();
        log.write(format_args!(
            "Done {}/{}",
            outcome.succeeded.len(),
            outcome.failed.len()
        ));
        log.flush();
        Ok(outcome)
    }

    async fn fan_out(
        &self,
        command: NodeCommand,
        log: &mut LogBuffer,
    ) -> ControlResult<FleetReport<Value>> {
        let hosts: BTreeSet<Host> = self.hosts.hosts().await?;
        if hosts.is_empty() {
            warn!("host directory is empty, nothing to do");
        }
        log.write(format_args!("Hosts: {}", hosts.len()));

        let connector = Arc::clone(&self.connector);
        let report = self
            .coordinator
            .run(
                &hosts,
                move |host| {
                    let connector = Arc::clone(&connector);
                    let command = command.clone();
                    async move { node::execute(connector.as_ref(), &host, &command).await }
                },
                log,
            )
            .await;
        Ok(report)
    }

    fn begin(&self, response: &ResponseStream, action: &str, app_id: &AppId) -> Operation {
        let id = ulid::Ulid::new().to_string().to_lowercase();
        let mut log = progress_log(self.config.log_depth, response);
        log.write(format_args!("{action} {app_id}, operation {id}"));
        Operation { id, log }
    }

    async fn finish(
        &self,
        app_id: &AppId,
        operation_id: &str,
        mut log: LogBuffer,
        result: ControlResult<FleetOutcome>,
        response: &ResponseStream,
    ) -> ControlResult<FleetOutcome> {
        match &result {
            Ok(outcome) => {
                info!(
                    app_id = %app_id,
                    succeeded = outcome.succeeded.len(),
                    failed = outcome.failed.len(),
                    "fleet operation finished"
                );
                log.write(format_args!(
                    "Done {}/{}",
                    outcome.succeeded.len(),
                    outcome.failed.len()
                ));
            }
            Err(e) => {
                error!(app_id = %app_id, error = %e, "fleet operation aborted");
                log.write(format_args!("Error: {e}"));
            }
        }
        log.flush();

        if self.config.persist_logs {
            let transcript = log.get_all().to_owned();
            match self
                .deploy_logs
                .save(&app_id.to_string(), operation_id, &transcript)
                .await
            {
                Ok(key) => debug!(key = %key, "deploy log saved"),
                Err(e) => warn!(app_id = %app_id, error = %e, "failed to save deploy log"),
            }
        }

        let outcome = result?;
        response.write_json(&outcome)?;
        Ok(outcome)
    }
}

impl std::fmt::Debug for DeploymentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentOrchestrator")
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

struct Operation {
    id: String,
    log: LogBuffer,
}

/// A log buffer whose flushed chunks stream into `response`.
fn progress_log(depth: usize, response: &ResponseStream) -> LogBuffer {
    let stream = response.clone();
    LogBuffer::with_callback(depth, move |chunk| {
        if let Err(e) = stream.write(chunk.to_owned()) {
            debug!(error = %e, "dropping progress chunk");
        }
    })
}

fn require(field: &str, value: &str) -> ControlResult<()> {
    if value.trim().is_empty() {
        return Err(ControlError::validation(format!("{field} is empty")));
    }
    Ok(())
}
