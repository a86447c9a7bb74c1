//! Edge Environment Protocol Definitions
//!
//! This crate defines the shared domain types exchanged between the
//! environment registry, the tunnel coordinator and the check-in surface.

pub mod environment;
pub mod job;
pub mod tunnel;

pub use environment::{
    AgentMetadata, EdgeSettings, Environment, EnvironmentId, EnvironmentStatus, EnvironmentType,
    ParseEnumError,
};
pub use job::{EdgeJob, EdgeJobEnvironmentMeta, EdgeJobId, EdgeJobLogsStatus, EdgeJobSchedule};
pub use tunnel::{CheckInResponse, TunnelDetails, TunnelStatus};

/// Default interval (in seconds) used by edge agents to check in
pub const DEFAULT_EDGE_CHECKIN_INTERVAL_SECS: u32 = 5;

