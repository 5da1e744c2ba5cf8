//! Fleet deployment orchestration.
//!
//! This module turns deploy, start, stop, info and group refresh commands into
//! store updates followed by a concurrent fan-out across the host directory.

mod orchestrator;

pub use orchestrator::{
    AppRequest, DeployRequest, DeploymentOrchestrator, RefreshRequest, StartRequest,
};
