//! Flow control worker.
//!
//! This crate provides the command worker of a fleet control plane. It keeps
//! routing groups, run-lists, profiles and the host list in a key/value
//! store, and orchestrates application deploy, start and stop across every
//! host of the fleet.
//!
//! # Architecture
//!
//! The worker is responsible for:
//!
//! - **Command dispatch**: routing named commands with JSON payloads to
//!   handlers, each answering over its own streaming response channel
//! - **Entity management**: thin commands over profiles, run-lists, routing
//!   groups, hosts and crash logs
//! - **Deployment orchestration**: updating the routing group and run-list for
//!   an application version, then starting it on every host
//! - **Fleet fan-out**: issuing one per-host operation to all hosts
//!   concurrently and partitioning them into succeeded and failed
//! - **API surface**: an HTTP endpoint that runs commands and streams their
//!   frames back as NDJSON
//!
//! # Deployment
//!
//! ```text
//! app-deploy ──▶ routing group ──▶ run-list ──▶ host set ──▶ start on every host
//!                     │                │            │
//!                     ▼                ▼            ▼
//!                  abort            abort         abort     (per-host failures
//!                                                            only in the outcome)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use flow_control::{
//!     dispatch::{register, Services},
//!     entities::StoredHosts,
//!     FleetCoordinator, MemoryStore, MockConnector,
//! };
//!
//! let store = Arc::new(MemoryStore::new());
//! let hosts = Arc::new(StoredHosts::new(store.clone()));
//! let services = Services::new(
//!     store,
//!     hosts,
//!     Arc::new(MockConnector::new()),
//!     FleetCoordinator::default(),
//!     Default::default(),
//! );
//! let dispatcher = register(Arc::new(services));
//!
//! let response = dispatcher
//!     .dispatch(
//!         "app-deploy",
//!         r#"{"appname":"web","version":"3","profile":"prod","runlist":"main"}"#,
//!     )
//!     .collect()
//!     .await;
//! println!("{}", response.text());
//! ```

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod deployment;
pub mod dispatch;
pub mod entities;
pub mod error;
pub mod fleet;
pub mod log_buffer;
pub mod node;
pub mod response;
pub mod service;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root
pub use config::ControlConfig;
pub use deployment::DeploymentOrchestrator;
pub use dispatch::Dispatcher;
pub use error::{ControlError, ControlResult};
pub use fleet::{FleetCoordinator, FleetReport};
pub use log_buffer::LogBuffer;
pub use node::{MockConnector, NodeConnector, NodeHandle};
pub use response::{ResponseFrame, ResponseReceiver, ResponseStream};
pub use service::ControlService;
pub use store::{KeyValueStore, MemoryStore};
pub use types::{AppId, FleetOutcome, Host, Runlist, RoutingGroup};
