//! Typed views over the key/value store.
//!
//! Each repository owns one namespace and encodes its entities as JSON.
//! Missing entities surface as [`ControlError::NotFound`] so callers can turn
//! them into "create it" logic where that makes sense.
//!
//! [`ControlError::NotFound`]: crate::error::ControlError::NotFound

mod crashlogs;
mod deploy_logs;
mod groups;
mod hosts;
mod profiles;
mod runlists;

pub use crashlogs::Crashlogs;
pub use deploy_logs::DeployLogs;
pub use groups::RoutingGroups;
pub use hosts::{HostDirectory, StoredHosts};
pub use profiles::Profiles;
pub use runlists::Runlists;
