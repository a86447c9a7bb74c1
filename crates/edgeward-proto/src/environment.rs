//! Environment records and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Numeric environment identifier
///
/// `EnvironmentId::UNASSIGNED` (0) marks a record the store has not numbered yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentId(pub i32);

impl EnvironmentId {
    pub const UNASSIGNED: EnvironmentId = EnvironmentId(0);

    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for EnvironmentId {
    fn from(value: i32) -> Self {
        EnvironmentId(value)
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: i32,
}

/// Kind of target an environment points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvironmentType {
    Docker,
    AgentOnDocker,
    Azure,
    EdgeAgentOnDocker,
    KubernetesLocal,
    AgentOnKubernetes,
    EdgeAgentOnKubernetes,
}

impl EnvironmentType {
    pub fn code(&self) -> i32 {
        match self {
            EnvironmentType::Docker => 1,
            EnvironmentType::AgentOnDocker => 2,
            EnvironmentType::Azure => 3,
            EnvironmentType::EdgeAgentOnDocker => 4,
            EnvironmentType::KubernetesLocal => 5,
            EnvironmentType::AgentOnKubernetes => 6,
            EnvironmentType::EdgeAgentOnKubernetes => 7,
        }
    }

    /// Whether agents of this kind poll inward and need a reverse tunnel
    pub fn is_edge(&self) -> bool {
        matches!(
            self,
            EnvironmentType::EdgeAgentOnDocker | EnvironmentType::EdgeAgentOnKubernetes
        )
    }
}

impl TryFrom<i32> for EnvironmentType {
    type Error = ParseEnumError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(EnvironmentType::Docker),
            2 => Ok(EnvironmentType::AgentOnDocker),
            3 => Ok(EnvironmentType::Azure),
            4 => Ok(EnvironmentType::EdgeAgentOnDocker),
            5 => Ok(EnvironmentType::KubernetesLocal),
            6 => Ok(EnvironmentType::AgentOnKubernetes),
            7 => Ok(EnvironmentType::EdgeAgentOnKubernetes),
            value => Err(ParseEnumError {
                kind: "environment type",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnvironmentStatus {
    #[default]
    Up,
    Down,
}

impl EnvironmentStatus {
    pub fn code(&self) -> i32 {
        match self {
            EnvironmentStatus::Up => 1,
            EnvironmentStatus::Down => 2,
        }
    }
}

impl TryFrom<i32> for EnvironmentStatus {
    type Error = ParseEnumError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(EnvironmentStatus::Up),
            2 => Ok(EnvironmentStatus::Down),
            value => Err(ParseEnumError {
                kind: "environment status",
                value,
            }),
        }
    }
}

/// Platform and version reported by the agent on check-in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub platform: String, // e.g., "linux", "windows"
    pub version: String,
}

/// Polling cadence of an agent running in async mode (seconds)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSettings {
    pub async_mode: bool,
    pub ping_interval: u32,
    pub snapshot_interval: u32,
    pub command_interval: u32,
}

/// A registered remote Docker/Kubernetes target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub id: EnvironmentId,
    pub name: String,
    pub kind: EnvironmentType,
    /// URL or IP address of the host associated to this environment
    pub url: String,
    /// URL or IP address where exposed containers will be reachable
    pub public_url: String,
    pub group_id: i32,
    pub status: EnvironmentStatus,
    /// Identifier of the edge agent, assigned once at enrollment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<String>,
    /// Key used to map the agent to this server
    pub edge_key: String,
    /// Check-in interval for the edge agent in seconds (0 = server default)
    pub edge_checkin_interval: u32,
    /// Unix seconds of the last observed check-in
    pub last_check_in_date: i64,
    pub agent: AgentMetadata,
    pub edge: EdgeSettings,
    pub is_edge_device: bool,
    pub user_trusted: bool,
}

impl Environment {
    /// Create a fresh, unnumbered record with default fields
    pub fn new(name: impl Into<String>, kind: EnvironmentType) -> Self {
        Self {
            id: EnvironmentId::UNASSIGNED,
            name: name.into(),
            kind,
            url: String::new(),
            public_url: String::new(),
            group_id: 1,
            status: EnvironmentStatus::Up,
            edge_id: None,
            edge_key: String::new(),
            edge_checkin_interval: 0,
            last_check_in_date: 0,
            agent: AgentMetadata::default(),
            edge: EdgeSettings::default(),
            is_edge_device: false,
            user_trusted: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<EnvironmentId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_edge_id(mut self, edge_id: impl Into<String>) -> Self {
        self.edge_id = Some(edge_id.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Edge ID if present and non-empty
    pub fn edge_id(&self) -> Option<&str> {
        self.edge_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Collapse an empty edge ID into `None`
    pub fn normalize(mut self) -> Self {
        if self.edge_id.as_deref().is_some_and(str::is_empty) {
            self.edge_id = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_type_codes() {
        for code in 1..=7 {
            let kind = EnvironmentType::try_from(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        assert!(EnvironmentType::try_from(0).is_err());
        assert!(EnvironmentType::try_from(8).is_err());
    }

    #[test]
    fn test_edge_kinds() {
        assert!(EnvironmentType::EdgeAgentOnDocker.is_edge());
        assert!(EnvironmentType::EdgeAgentOnKubernetes.is_edge());
        assert!(!EnvironmentType::AgentOnDocker.is_edge());
    }

    #[test]
    fn test_empty_edge_id_is_normalized() {
        let env = Environment::new("local", EnvironmentType::Docker)
            .with_edge_id("")
            .normalize();
        assert_eq!(env.edge_id, None);
        assert_eq!(env.edge_id(), None);

        let env = Environment::new("edge", EnvironmentType::EdgeAgentOnDocker).with_edge_id("e1");
        assert_eq!(env.edge_id(), Some("e1"));
    }

    #[test]
    fn test_environment_json_omits_missing_edge_id() {
        let env = Environment::new("local", EnvironmentType::Docker).with_id(3);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["id"], 3);
        assert!(json.get("edge_id").is_none());
    }
}
