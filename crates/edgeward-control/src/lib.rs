//! Control plane for edge environments
//!
//! Tracks which environments exist and when their agents last checked in,
//! decides whether each agent should hold a reverse tunnel open, and queues
//! edge jobs for delivery on the next poll.
pub mod config;
pub mod error;
pub mod jobs;
pub mod port_allocator;
pub mod registry;
pub mod service;
pub mod sweeper;
pub mod tunnel;

pub use config::{ControlConfig, PortRange};
pub use error::{RegistryError, ServiceError, TunnelError};
pub use jobs::EdgeJobDispatcher;
pub use port_allocator::{PortAllocator, RangePortAllocator};
pub use registry::EnvironmentRegistry;
pub use service::{EdgeKeyConfig, EdgeService};
pub use sweeper::TunnelSweeper;
pub use tunnel::{KnownEnvironments, TunnelCoordinator};
