//! Listener port allocation for reverse tunnels

use edgeward_proto::EnvironmentId;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::config::PortRange;

/// Trait for port allocation (reverse tunnels)
pub trait PortAllocator: Send + Sync {
    /// Allocate a port for the given environment
    /// If requested_port is Some, try to allocate that specific port
    /// If requested_port is None or unavailable, allocate any available port
    fn allocate(
        &self,
        environment_id: EnvironmentId,
        requested_port: Option<u16>,
    ) -> Result<u16, String>;
    fn deallocate(&self, environment_id: EnvironmentId);
    fn allocated_port(&self, environment_id: EnvironmentId) -> Option<u16>;
}

#[derive(Debug, Default)]
struct Allocations {
    available: BTreeSet<u16>,
    allocated: HashMap<EnvironmentId, u16>,
}

/// Allocator handing out ports from a fixed range
///
/// An environment prefers the port derived from its ID so reconnecting
/// agents tend to get the same listener back.
#[derive(Debug)]
pub struct RangePortAllocator {
    range: PortRange,
    state: Mutex<Allocations>,
}

impl RangePortAllocator {
    pub fn new(range: PortRange) -> Self {
        info!(
            "Tunnel port range: {}-{} ({} ports available)",
            range.start,
            range.end,
            range.size()
        );

        Self {
            range,
            state: Mutex::new(Allocations {
                available: (range.start..=range.end).collect(),
                allocated: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Allocations> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn preferred_port(&self, environment_id: EnvironmentId) -> u16 {
        let offset = (environment_id.0.unsigned_abs() as usize) % self.range.size();
        // offset < range size, which fits in u16
        self.range.start + offset as u16
    }

    /// Number of ports still free
    pub fn available(&self) -> usize {
        self.lock().available.len()
    }
}

impl PortAllocator for RangePortAllocator {
    fn allocate(
        &self,
        environment_id: EnvironmentId,
        requested_port: Option<u16>,
    ) -> Result<u16, String> {
        let mut state = self.lock();

        if let Some(&port) = state.allocated.get(&environment_id) {
            return Ok(port);
        }

        let candidate = requested_port
            .filter(|port| state.available.contains(port))
            .or_else(|| {
                let preferred = self.preferred_port(environment_id);
                state.available.contains(&preferred).then_some(preferred)
            })
            .or_else(|| state.available.first().copied());

        let port = candidate.ok_or_else(|| {
            format!(
                "Port range {}-{} exhausted",
                self.range.start, self.range.end
            )
        })?;

        state.available.remove(&port);
        state.allocated.insert(environment_id, port);
        debug!(environment_id = %environment_id, port, "Allocated tunnel port");

        Ok(port)
    }

    fn deallocate(&self, environment_id: EnvironmentId) {
        let mut state = self.lock();
        if let Some(port) = state.allocated.remove(&environment_id) {
            state.available.insert(port);
            debug!(environment_id = %environment_id, port, "Released tunnel port");
        }
    }

    fn allocated_port(&self, environment_id: EnvironmentId) -> Option<u16> {
        self.lock().allocated.get(&environment_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_sticky_per_environment() {
        let allocator = RangePortAllocator::new(PortRange::range(9000, 9009));

        let first = allocator.allocate(EnvironmentId(3), None).unwrap();
        let again = allocator.allocate(EnvironmentId(3), None).unwrap();
        assert_eq!(first, again);
        assert_eq!(first, 9003);
        assert_eq!(allocator.available(), 9);
    }

    #[test]
    fn test_requested_port_honored_when_free() {
        let allocator = RangePortAllocator::new(PortRange::range(9000, 9009));

        let port = allocator.allocate(EnvironmentId(1), Some(9005)).unwrap();
        assert_eq!(port, 9005);

        // Taken: falls back to the preferred port of the second environment
        let port = allocator.allocate(EnvironmentId(2), Some(9005)).unwrap();
        assert_eq!(port, 9002);
    }

    #[test]
    fn test_collision_falls_back_to_first_free() {
        let allocator = RangePortAllocator::new(PortRange::range(9000, 9001));

        assert_eq!(allocator.allocate(EnvironmentId(1), None).unwrap(), 9001);
        // Environment 3 prefers 9001 as well
        assert_eq!(allocator.allocate(EnvironmentId(3), None).unwrap(), 9000);
        assert!(allocator.allocate(EnvironmentId(4), None).is_err());
    }

    #[test]
    fn test_deallocate_returns_port_to_pool() {
        let allocator = RangePortAllocator::new(PortRange::range(9000, 9000));

        let port = allocator.allocate(EnvironmentId(1), None).unwrap();
        assert!(allocator.allocate(EnvironmentId(2), None).is_err());

        allocator.deallocate(EnvironmentId(1));
        assert_eq!(allocator.allocated_port(EnvironmentId(1)), None);
        assert_eq!(allocator.allocate(EnvironmentId(2), None).unwrap(), port);
    }
}
