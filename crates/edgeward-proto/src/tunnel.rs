//! Reverse tunnel status and check-in payloads

use crate::environment::EnvironmentId;
use crate::job::{EdgeJob, EdgeJobSchedule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the reverse tunnel to one edge agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TunnelStatus {
    /// No tunnel expected
    #[default]
    Idle,
    /// A tunnel should be opened by the agent on its next poll
    Required,
    /// Tunnel open and kept alive by activity
    Active,
}

impl TunnelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelStatus::Idle => "IDLE",
            TunnelStatus::Required => "REQUIRED",
            TunnelStatus::Active => "ACTIVE",
        }
    }
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a tunnel as seen by operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelDetails {
    pub status: TunnelStatus,
    pub last_activity: DateTime<Utc>,
    pub port: Option<u16>,
    pub jobs: Vec<EdgeJob>,
    /// Signed credentials the agent presents when opening the tunnel
    pub credentials: Option<String>,
}

/// Reply to an agent poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInResponse {
    pub environment_id: EnvironmentId,
    pub status: TunnelStatus,
    pub port: Option<u16>,
    pub credentials: Option<String>,
    /// Seconds the agent should wait before its next poll
    pub checkin_interval: u32,
    pub schedules: Vec<EdgeJobSchedule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&TunnelStatus::Required).unwrap(),
            "\"REQUIRED\""
        );
        let status: TunnelStatus = serde_json::from_str("\"ACTIVE\"").unwrap();
        assert_eq!(status, TunnelStatus::Active);
        assert_eq!(TunnelStatus::default().to_string(), "IDLE");
    }
}
