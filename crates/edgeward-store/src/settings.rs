//! Server-wide edge settings

use async_trait::async_trait;
use edgeward_proto::DEFAULT_EDGE_CHECKIN_INTERVAL_SECS;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Default keep-alive applied to active tunnels (seconds)
pub const DEFAULT_TUNNEL_KEEP_ALIVE_SECS: u32 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Check-in interval handed to agents whose environment does not set one
    pub edge_agent_checkin_interval: u32,
    pub tunnel_keep_alive_secs: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            edge_agent_checkin_interval: DEFAULT_EDGE_CHECKIN_INTERVAL_SECS,
            tunnel_keep_alive_secs: DEFAULT_TUNNEL_KEEP_ALIVE_SECS,
        }
    }
}

/// Access to the settings record
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Current settings; defaults when the record was never written
    async fn settings(&self) -> Result<Settings, StoreError>;

    async fn update_settings(&self, settings: &Settings) -> Result<(), StoreError>;
}
