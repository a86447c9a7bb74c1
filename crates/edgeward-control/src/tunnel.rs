//! Reverse tunnel coordination
//!
//! Edge agents sit behind NAT and poll outward, so the control plane can only
//! signal that it wants a tunnel and wait for the next poll to pick that up.
//! Each environment moves between three states:
//!
//! ```text
//!            set_required               check-in
//!   Idle ─────────────────▶ Required ───────────▶ Active
//!    ▲                                              │
//!    └──────── set_idle / keep-alive expired ───────┘
//! ```
//!
//! State is created lazily on first reference and dropped only when the
//! environment itself is deleted.

use crate::error::TunnelError;
use crate::jobs::EdgeJobDispatcher;
use crate::port_allocator::PortAllocator;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use edgeward_auth::{CredentialIssuer, TunnelCredentials};
use edgeward_proto::{EnvironmentId, TunnelDetails, TunnelStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Source of truth for which environment IDs exist
pub trait KnownEnvironments: Send + Sync {
    fn contains(&self, environment_id: EnvironmentId) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TunnelState {
    Idle,
    Required,
    Active { deadline: DateTime<Utc> },
}

impl TunnelState {
    fn status(&self) -> TunnelStatus {
        match self {
            TunnelState::Idle => TunnelStatus::Idle,
            TunnelState::Required => TunnelStatus::Required,
            TunnelState::Active { .. } => TunnelStatus::Active,
        }
    }
}

#[derive(Debug, Clone)]
struct TunnelEntry {
    state: TunnelState,
    last_activity: DateTime<Utc>,
    port: Option<u16>,
    /// Port held before the last release, requested again on reopen
    previous_port: Option<u16>,
    credentials: Option<TunnelCredentials>,
}

impl TunnelEntry {
    fn new() -> Self {
        Self {
            state: TunnelState::Idle,
            last_activity: Utc::now(),
            port: None,
            previous_port: None,
            credentials: None,
        }
    }
}

fn deadline_after(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|duration| now.checked_add_signed(duration))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Per-environment tunnel state machine
pub struct TunnelCoordinator {
    tunnels: DashMap<EnvironmentId, TunnelEntry>,
    environments: Arc<dyn KnownEnvironments>,
    ports: Arc<dyn PortAllocator>,
    credentials: Arc<CredentialIssuer>,
    jobs: Arc<EdgeJobDispatcher>,
    keep_alive_secs: AtomicU64,
    activated: Notify,
}

impl TunnelCoordinator {
    pub fn new(
        environments: Arc<dyn KnownEnvironments>,
        ports: Arc<dyn PortAllocator>,
        credentials: Arc<CredentialIssuer>,
        jobs: Arc<EdgeJobDispatcher>,
        keep_alive: Duration,
    ) -> Self {
        Self {
            tunnels: DashMap::new(),
            environments,
            ports,
            credentials,
            jobs,
            keep_alive_secs: AtomicU64::new(keep_alive.as_secs()),
            activated: Notify::new(),
        }
    }

    /// Keep-alive applied on activation
    pub fn keep_alive_duration(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.load(Ordering::Relaxed))
    }

    pub fn set_keep_alive_duration(&self, keep_alive: Duration) {
        self.keep_alive_secs
            .store(keep_alive.as_secs(), Ordering::Relaxed);
    }

    fn ensure_known(&self, environment_id: EnvironmentId) -> Result<(), TunnelError> {
        if self.environments.contains(environment_id) {
            Ok(())
        } else {
            Err(TunnelError::UnknownEnvironment(environment_id))
        }
    }

    /// Reserve a listener port unless the entry already holds one
    ///
    /// Returns the port and whether it was newly reserved. The port released
    /// last time is requested first so reconnecting agents keep their listener.
    fn reserve_port(
        &self,
        environment_id: EnvironmentId,
        entry: &TunnelEntry,
    ) -> Result<(u16, bool), TunnelError> {
        if let Some(port) = entry.port {
            return Ok((port, false));
        }
        let port = self
            .ports
            .allocate(environment_id, entry.previous_port)
            .map_err(TunnelError::PortAllocation)?;
        Ok((port, true))
    }

    fn release(&self, environment_id: EnvironmentId, entry: &mut TunnelEntry) {
        if let Some(port) = entry.port.take() {
            self.ports.deallocate(environment_id);
            entry.previous_port = Some(port);
        }
        entry.credentials = None;
    }

    /// Undo a transition that raced with the environment's deletion
    fn drop_if_forgotten(&self, environment_id: EnvironmentId) -> Result<(), TunnelError> {
        if self.environments.contains(environment_id) {
            return Ok(());
        }
        self.invalidate(environment_id);
        Err(TunnelError::UnknownEnvironment(environment_id))
    }

    /// Ask the agent to open a tunnel on its next poll
    ///
    /// Idle and Active move to Required; Required stays put. Entering the
    /// state reserves a listener port and issues fresh credentials when the
    /// held ones are missing or expired. Nothing is kept if either step fails.
    pub fn set_required(&self, environment_id: EnvironmentId) -> Result<(), TunnelError> {
        self.ensure_known(environment_id)?;

        {
            let mut entry = self
                .tunnels
                .entry(environment_id)
                .or_insert_with(TunnelEntry::new);

            if entry.state == TunnelState::Required {
                return Ok(());
            }

            let (port, reserved) = self.reserve_port(environment_id, &entry)?;

            let now = Utc::now();
            let stale = entry
                .credentials
                .as_ref()
                .map_or(true, |credentials| credentials.is_expired_at(now));
            let credentials = if stale {
                match self.credentials.issue(environment_id) {
                    Ok(credentials) => Some(credentials),
                    Err(e) => {
                        if reserved {
                            self.ports.deallocate(environment_id);
                        }
                        return Err(e.into());
                    }
                }
            } else {
                entry.credentials.take()
            };

            entry.port = Some(port);
            entry.credentials = credentials;
            entry.state = TunnelState::Required;
            info!(environment_id = %environment_id, port, "Tunnel required");
        }

        self.drop_if_forgotten(environment_id)
    }

    /// Mark the agent's tunnel as open and start its keep-alive window
    pub fn set_active(&self, environment_id: EnvironmentId) -> Result<(), TunnelError> {
        self.ensure_known(environment_id)?;

        let now = Utc::now();
        let deadline = deadline_after(now, self.keep_alive_duration());

        {
            let mut entry = self
                .tunnels
                .entry(environment_id)
                .or_insert_with(TunnelEntry::new);

            let (port, _) = self.reserve_port(environment_id, &entry)?;
            let previous = entry.state.status();
            entry.port = Some(port);
            entry.state = TunnelState::Active { deadline };
            entry.last_activity = now;

            if previous != TunnelStatus::Active {
                info!(environment_id = %environment_id, port, from = %previous, "Tunnel active");
            }
        }

        self.drop_if_forgotten(environment_id)?;
        self.activated.notify_waiters();
        Ok(())
    }

    /// Force the tunnel closed and release its port
    pub fn set_idle(&self, environment_id: EnvironmentId) -> Result<(), TunnelError> {
        self.ensure_known(environment_id)?;

        if let Some(mut entry) = self.tunnels.get_mut(&environment_id) {
            if entry.state != TunnelState::Idle {
                info!(environment_id = %environment_id, "Tunnel stopped");
            }
            entry.state = TunnelState::Idle;
            self.release(environment_id, &mut entry);
        }
        Ok(())
    }

    /// Extend an active tunnel's deadline to at least `now + duration`
    ///
    /// Ignored unless the tunnel is Active; returns whether it applied.
    pub fn keep_alive(
        &self,
        environment_id: EnvironmentId,
        duration: Duration,
    ) -> Result<bool, TunnelError> {
        self.ensure_known(environment_id)?;

        let Some(mut entry) = self.tunnels.get_mut(&environment_id) else {
            return Ok(false);
        };
        let TunnelState::Active { deadline } = entry.state else {
            debug!(environment_id = %environment_id, state = %entry.state.status(), "Keep-alive ignored");
            return Ok(false);
        };

        let now = Utc::now();
        entry.state = TunnelState::Active {
            deadline: deadline.max(deadline_after(now, duration)),
        };
        entry.last_activity = now;
        Ok(true)
    }

    pub fn status(&self, environment_id: EnvironmentId) -> Result<TunnelStatus, TunnelError> {
        self.ensure_known(environment_id)?;

        Ok(self
            .tunnels
            .get(&environment_id)
            .map(|entry| entry.state.status())
            .unwrap_or_default())
    }

    /// Operator view of a tunnel including pending jobs
    pub fn details(&self, environment_id: EnvironmentId) -> Result<TunnelDetails, TunnelError> {
        self.ensure_known(environment_id)?;

        let entry = self
            .tunnels
            .get(&environment_id)
            .map(|entry| entry.clone())
            .unwrap_or_else(TunnelEntry::new);

        Ok(TunnelDetails {
            status: entry.state.status(),
            last_activity: entry.last_activity,
            port: entry.port,
            jobs: self.jobs.pending_for(environment_id),
            credentials: entry.credentials.map(|credentials| credentials.token),
        })
    }

    /// Request a tunnel if needed and wait until the agent opens it
    pub async fn active_tunnel(
        &self,
        environment_id: EnvironmentId,
        wait: Duration,
    ) -> Result<TunnelDetails, TunnelError> {
        if self.status(environment_id)? == TunnelStatus::Idle {
            self.set_required(environment_id)?;
        }

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let notified = self.activated.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.status(environment_id)? == TunnelStatus::Active {
                return self.details(environment_id);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(TunnelError::ActivationTimeout(environment_id));
            }
        }
    }

    /// Drop all state for a deleted environment
    pub fn invalidate(&self, environment_id: EnvironmentId) {
        if let Some((_, mut entry)) = self.tunnels.remove(&environment_id) {
            self.release(environment_id, &mut entry);
            debug!(environment_id = %environment_id, "Tunnel state invalidated");
        }
    }

    /// Demote every active tunnel whose deadline has passed
    pub fn sweep(&self) -> Vec<EnvironmentId> {
        self.sweep_at(Utc::now())
    }

    /// Sweep against an explicit clock reading
    ///
    /// Candidates are snapshotted first and each is re-checked under its own
    /// entry lock, so check-ins are never blocked for the whole scan.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Vec<EnvironmentId> {
        let expired = |state: &TunnelState| {
            matches!(state, TunnelState::Active { deadline } if now > *deadline)
        };

        let candidates: Vec<EnvironmentId> = self
            .tunnels
            .iter()
            .filter(|entry| expired(&entry.state))
            .map(|entry| *entry.key())
            .collect();

        let mut demoted = Vec::with_capacity(candidates.len());
        for environment_id in candidates {
            let Some(mut entry) = self.tunnels.get_mut(&environment_id) else {
                continue;
            };
            if !expired(&entry.state) {
                continue;
            }

            entry.state = TunnelState::Idle;
            self.release(environment_id, &mut entry);
            info!(environment_id = %environment_id, "Tunnel keep-alive expired");
            demoted.push(environment_id);
        }

        demoted
    }
}
