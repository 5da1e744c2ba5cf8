//! Concurrent fan-out of one operation across a host set.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::config::FleetConfig;
use crate::error::{ControlError, ControlResult};
use crate::log_buffer::LogBuffer;
use crate::types::{FleetOutcome, Host};

/// Per-host results of one fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetReport<T> {
    /// Value returned by every host that succeeded.
    pub results: BTreeMap<Host, T>,
    /// Failure reason for every host that failed.
    pub failures: BTreeMap<Host, String>,
}

impl<T> FleetReport<T> {
    /// Partition of hosts into succeeded and failed.
    #[must_use]
    pub fn outcome(&self) -> FleetOutcome {
        FleetOutcome {
            succeeded: self.results.keys().cloned().collect(),
            failed: self.failures.keys().cloned().collect(),
        }
    }
}

impl<T> Default for FleetReport<T> {
    fn default() -> Self {
        Self {
            results: BTreeMap::new(),
            failures: BTreeMap::new(),
        }
    }
}

/// Issues an operation to every host concurrently and aggregates the results.
#[derive(Debug, Clone)]
pub struct FleetCoordinator {
    host_timeout: Duration,
}

impl FleetCoordinator {
    /// Create a coordinator that bounds each host's operation by `host_timeout`.
    #[must_use]
    pub const fn new(host_timeout: Duration) -> Self {
        Self { host_timeout }
    }

    /// Create a coordinator from configuration.
    #[must_use]
    pub const fn from_config(config: &FleetConfig) -> Self {
        Self::new(Duration::from_secs(config.host_timeout_secs))
    }

    /// Run `op` against every host and wait for all of them.
    ///
    /// Each host runs in its own task; a failure, timeout or panic on one host
    /// never affects another. Per-host results are written to `log` in
    /// completion order. Every host in `hosts` ends up in exactly one side of
    /// the report.
    pub async fn run<T, F, Fut>(
        &self,
        hosts: &BTreeSet<Host>,
        op: F,
        log: &mut LogBuffer,
    ) -> FleetReport<T>
    where
        T: Send + 'static,
        F: Fn(Host) -> Fut,
        Fut: Future<Output = ControlResult<T>> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for host in hosts {
            let operation = op(host.clone());
            let host = host.clone();
            let limit = self.host_timeout;
            tasks.spawn(async move {
                let result = match tokio::time::timeout(limit, operation).await {
                    Ok(result) => result,
                    Err(_) => Err(ControlError::Timeout {
                        host: host.clone(),
                        secs: limit.as_secs(),
                    }),
                };
                (host, result)
            });
        }

        debug!(hosts = hosts.len(), "fan-out started");

        let mut report = FleetReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((host, Ok(value))) => {
                    log.write(format_args!("{host}: ok"));
                    report.results.insert(host, value);
                }
                Ok((host, Err(e))) => {
                    warn!(host = %host, error = %e, "host operation failed");
                    log.write(format_args!("{host}: failed: {e}"));
                    report.failures.insert(host, e.to_string());
                }
                Err(e) => {
                    error!(error = %e, "host task aborted");
                }
            }
        }

        // A task that panicked took its host name with it.
        for host in hosts {
            if !report.results.contains_key(host) && !report.failures.contains_key(host) {
                log.write(format_args!("{host}: failed: task aborted"));
                report
                    .failures
                    .insert(host.clone(), "task aborted".to_owned());
            }
        }

        debug!(
            succeeded = report.results.len(),
            failed = report.failures.len(),
            "fan-out finished"
        );
        report
    }
}

impl Default for FleetCoordinator {
    fn default() -> Self {
        Self::from_config(&FleetConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::Instant;

    use super::*;
    use crate::node::{execute, MockConnector, NodeCommand, NodeConnector};

    fn hosts(names: &[&str]) -> BTreeSet<Host> {
        names.iter().map(|h| (*h).to_owned()).collect()
    }

    fn start_op(
        connector: Arc<dyn NodeConnector>,
    ) -> impl Fn(Host) -> std::pin::Pin<Box<dyn Future<Output = ControlResult<()>> + Send>> {
        move |host| {
            let connector = Arc::clone(&connector);
            Box::pin(async move {
                let command = NodeCommand::Start {
                    app_id: "web_3".to_owned(),
                    profile: "prod".to_owned(),
                };
                execute(connector.as_ref(), &host, &command).await.map(drop)
            })
        }
    }

    #[tokio::test]
    async fn partitions_hosts_by_result() {
        let connector = MockConnector::new()
            .with_failing_host("h2")
            .with_unreachable_host("h4");
        let all = hosts(&["h1", "h2", "h3", "h4", "h5"]);
        let mut log = LogBuffer::new(100);

        let report = FleetCoordinator::default()
            .run(&all, start_op(Arc::new(connector.clone())), &mut log)
            .await;
        let outcome = report.outcome();

        assert_eq!(outcome.attempted(), 5);
        assert_eq!(outcome.failed, hosts(&["h2", "h4"]));
        assert_eq!(outcome.succeeded, hosts(&["h1", "h3", "h5"]));
        assert_eq!(connector.disconnects(), connector.connects());

        log.flush();
        assert!(log.get_all().contains("h2: failed"));
        assert!(log.get_all().contains("h1: ok"));
    }

    #[tokio::test]
    async fn empty_host_set_is_vacuous_success() {
        let mut log = LogBuffer::default();
        let report = FleetCoordinator::default()
            .run(&BTreeSet::new(), start_op(Arc::new(MockConnector::new())), &mut log)
            .await;
        assert_eq!(report.outcome(), FleetOutcome::default());
    }

    #[tokio::test(start_paused = true)]
    async fn hosts_run_concurrently() {
        let connector = MockConnector::new().with_latency(Duration::from_millis(100));
        let all = hosts(&["h1", "h2", "h3", "h4", "h5", "h6"]);
        let mut log = LogBuffer::default();

        let started = Instant::now();
        let report = FleetCoordinator::default()
            .run(&all, start_op(Arc::new(connector)), &mut log)
            .await;
        let elapsed = started.elapsed();

        assert_eq!(report.results.len(), 6);
        assert!(elapsed < Duration::from_millis(200), "took {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_host_times_out_without_delaying_others() {
        let connector = MockConnector::new().with_host_latency("slow", Duration::from_secs(60));
        let all = hosts(&["fast", "slow"]);
        let mut log = LogBuffer::default();

        let report = FleetCoordinator::new(Duration::from_secs(5))
            .run(&all, start_op(Arc::new(connector)), &mut log)
            .await;

        assert!(report.results.contains_key("fast"));
        assert!(report.failures["slow"].contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_host_is_still_disconnected() {
        let connector = MockConnector::new().with_host_latency("slow", Duration::from_secs(60));
        let all = hosts(&["fast", "slow"]);
        let mut log = LogBuffer::default();

        let report = FleetCoordinator::new(Duration::from_secs(5))
            .run(&all, start_op(Arc::new(connector.clone())), &mut log)
            .await;
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(report.outcome().failed, hosts(&["slow"]));
        assert_eq!(connector.connects(), 2);
        assert_eq!(connector.disconnects(), connector.connects());
    }

    #[tokio::test]
    async fn panicking_host_counts_as_failure() {
        let all = hosts(&["ok", "boom"]);
        let mut log = LogBuffer::default();

        let report = FleetCoordinator::default()
            .run(
                &all,
                |host: Host| async move {
                    assert_ne!(host, "boom", "node exploded");
                    Ok::<_, ControlError>(host.len())
                },
                &mut log,
            )
            .await;

        assert_eq!(report.results.get("ok"), Some(&2));
        assert_eq!(report.failures["boom"], "task aborted");
    }
}
