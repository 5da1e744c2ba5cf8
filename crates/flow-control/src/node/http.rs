//! HTTP client for the per-host node service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::Serialize;
use serde_json::Value;

use crate::config::NodeConfig;
use crate::error::{ControlError, ControlResult};
use crate::types::RoutingGroup;

use super::{NodeConnector, NodeHandle};

#[derive(Serialize)]
struct StartRequest<'a> {
    profile: &'a str,
}

#[derive(Serialize)]
struct GroupRequest<'a> {
    members: &'a RoutingGroup,
}

/// Connector for node services reachable over HTTP.
///
/// Every request carries the configured timeout, so an unreachable host
/// fails instead of stalling the fan-out.
#[derive(Debug, Clone)]
pub struct HttpNodeConnector {
    client: Client,
    scheme: String,
    port: u16,
}

impl HttpNodeConnector {
    /// Create a connector from configuration.
    pub fn new(config: &NodeConfig) -> ControlResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ControlError::Http)?;

        Ok(Self {
            client,
            scheme: config.scheme.clone(),
            port: config.port,
        })
    }

    /// Base URL of the node service on `host`.
    ///
    /// A host that already names a port is used as is.
    pub fn base_url(&self, host: &str) -> ControlResult<Url> {
        let authority = if host.contains(':') {
            host.to_owned()
        } else {
            format!("{host}:{}", self.port)
        };
        Url::parse(&format!("{}://{authority}/", self.scheme))
            .map_err(|e| ControlError::node(host, format!("invalid address: {e}")))
    }
}

#[async_trait]
impl NodeConnector for HttpNodeConnector {
    async fn connect(&self, host: &str) -> ControlResult<Box<dyn NodeHandle>> {
        let base_url = self.base_url(host)?;
        Ok(Box::new(HttpNodeHandle {
            client: self.client.clone(),
            host: host.to_owned(),
            base_url,
        }))
    }
}

struct HttpNodeHandle {
    client: Client,
    host: String,
    base_url: Url,
}

impl HttpNodeHandle {
    fn url(&self, path: &str) -> ControlResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ControlError::node(&self.host, format!("invalid path {path}: {e}")))
    }

    async fn check(&self, action: &str, response: Response) -> ControlResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ControlError::node(
            &self.host,
            format!("{action} failed: {status} {}", body.trim()),
        ))
    }

    fn transport_error(&self, err: reqwest::Error) -> ControlError {
        ControlError::node(&self.host, err.to_string())
    }
}

#[async_trait]
impl NodeHandle for HttpNodeHandle {
    async fn start_app(&self, app_id: &str, profile: &str) -> ControlResult<()> {
        let response = self
            .client
            .post(self.url(&format!("apps/{app_id}/start"))?)
            .json(&StartRequest { profile })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.check("start", response).await.map(drop)
    }

    async fn stop_app(&self, app_id: &str) -> ControlResult<()> {
        let response = self
            .client
            .post(self.url(&format!("apps/{app_id}/stop"))?)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.check("stop", response).await.map(drop)
    }

    async fn info(&self, app_id: &str) -> ControlResult<Value> {
        let response = self
            .client
            .get(self.url(&format!("apps/{app_id}/info"))?)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.check("info", response)
            .await?
            .json()
            .await
            .map_err(|e| self.transport_error(e))
    }

    async fn refresh_group(&self, name: &str, group: &RoutingGroup) -> ControlResult<()> {
        let response = self
            .client
            .put(self.url(&format!("groups/{name}"))?)
            .json(&GroupRequest { members: group })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.check("group refresh", response).await.map(drop)
    }

    async fn disconnect(&self) {}
}
