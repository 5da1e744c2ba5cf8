//! Core types for flow-control.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Separator between an application's name and version in its identifier.
pub const VERSION_DELIMITER: char = '_';

/// Address of a fleet host as stored in the host directory.
pub type Host = String;

/// Stable identifier of one version of an application (`name_version`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppId {
    name: String,
    version: String,
}

impl AppId {
    /// Build an identifier from a name and version.
    ///
    /// The name must be non-empty and must not contain [`VERSION_DELIMITER`],
    /// otherwise the identifier could not be split back unambiguously.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self, ControlError> {
        let name = name.into();
        let version = version.into();

        if name.is_empty() {
            return Err(ControlError::validation("application name is empty"));
        }
        if name.contains(VERSION_DELIMITER) {
            return Err(ControlError::validation(format!(
                "application name {name:?} contains the version delimiter {VERSION_DELIMITER:?}"
            )));
        }
        if version.is_empty() {
            return Err(ControlError::validation(format!(
                "application {name} has an empty version"
            )));
        }

        Ok(Self { name, version })
    }

    /// Application name, shared by every version.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Application version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Split back into `(name, version)`.
    #[must_use]
    pub fn into_parts(self) -> (String, String) {
        (self.name, self.version)
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, VERSION_DELIMITER, self.version)
    }
}

impl FromStr for AppId {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = s.split_once(VERSION_DELIMITER).ok_or_else(|| {
            ControlError::validation(format!("{s} is not a name{VERSION_DELIMITER}version pair"))
        })?;
        Self::new(name, version)
    }
}

impl Serialize for AppId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AppId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Named, weighted set of application identifiers used for traffic distribution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingGroup {
    /// Member application identifiers and their weights.
    pub members: BTreeMap<String, u32>,
}

impl RoutingGroup {
    /// Insert or replace the weight of a member.
    pub fn upsert(&mut self, app_id: &AppId, weight: u32) -> Option<u32> {
        self.members.insert(app_id.to_string(), weight)
    }

    /// Remove a member, returning its weight if it was present.
    pub fn remove(&mut self, app_id: &str) -> Option<u32> {
        self.members.remove(app_id)
    }
}

/// Named mapping from application identifier to execution profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Runlist {
    /// Profile assigned to each application identifier.
    pub entries: BTreeMap<String, String>,
}

impl Runlist {
    /// Assign a profile, replacing any earlier assignment.
    pub fn assign(&mut self, app_id: &AppId, profile: impl Into<String>) -> Option<String> {
        self.entries.insert(app_id.to_string(), profile.into())
    }
}

/// Partition of a host set into hosts that succeeded and hosts that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetOutcome {
    /// Hosts on which the operation completed.
    pub succeeded: BTreeSet<Host>,
    /// Hosts on which the operation failed.
    pub failed: BTreeSet<Host>,
}

impl FleetOutcome {
    /// Total number of hosts attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_id_round_trip() {
        let id = AppId::new("web", "3").unwrap();
        assert_eq!(id.to_string(), "web_3");

        let parsed: AppId = "web_3".parse().unwrap();
        assert_eq!(parsed.into_parts(), ("web".to_owned(), "3".to_owned()));
    }

    #[test]
    fn app_id_version_may_contain_delimiter() {
        let id = AppId::new("api", "1_2_rc").unwrap();
        let parsed: AppId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.version(), "1_2_rc");
    }

    #[test]
    fn app_id_rejects_delimiter_in_name() {
        let err = AppId::new("my_app", "1").unwrap_err();
        assert!(matches!(err, ControlError::Validation(_)));
    }

    #[test]
    fn app_id_rejects_empty_parts() {
        assert!(AppId::new("", "1").is_err());
        assert!(AppId::new("web", "").is_err());
        assert!("web".parse::<AppId>().is_err());
    }

    #[test]
    fn routing_group_upsert_replaces_weight() {
        let id = AppId::new("web", "3").unwrap();
        let mut group = RoutingGroup::default();
        assert_eq!(group.upsert(&id, 5), None);
        assert_eq!(group.upsert(&id, 10), Some(5));
        assert_eq!(group.members.len(), 1);
        assert_eq!(group.members["web_3"], 10);
    }

    #[test]
    fn runlist_serialises_as_plain_map() {
        let mut runlist = Runlist::default();
        runlist.assign(&AppId::new("web", "3").unwrap(), "prod");
        let json = serde_json::to_string(&runlist).unwrap();
        assert_eq!(json, r#"{"web_3":"prod"}"#);
    }
}
