//! Edge service facade
//!
//! Wires the registry, tunnel coordinator and job dispatcher together and
//! exposes the operations the API layer calls: environment CRUD, agent
//! check-in, operator tunnel controls, edge jobs, enrollment keys and
//! settings.

use crate::error::{RegistryError, ServiceError};
use crate::jobs::EdgeJobDispatcher;
use crate::registry::EnvironmentRegistry;
use crate::tunnel::{KnownEnvironments, TunnelCoordinator};
use edgeward_auth::{CredentialIssuer, EdgeKey, TunnelClaims};
use edgeward_proto::{
    AgentMetadata, CheckInResponse, EdgeJob, EdgeJobId, Environment, EnvironmentId,
    TunnelDetails, TunnelStatus,
};
use edgeward_store::{Settings, SettingsStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// Addresses and fingerprint baked into enrollment keys
#[derive(Debug, Clone)]
pub struct EdgeKeyConfig {
    pub api_url: String,
    pub tunnel_addr: String,
    pub fingerprint: String,
}

pub struct EdgeService {
    registry: Arc<EnvironmentRegistry>,
    tunnels: Arc<TunnelCoordinator>,
    jobs: Arc<EdgeJobDispatcher>,
    credentials: Arc<CredentialIssuer>,
    settings_store: Arc<dyn SettingsStore>,
    settings: RwLock<Settings>,
    edge_key: EdgeKeyConfig,
}

impl EdgeService {
    /// Build the service and apply persisted settings to the coordinator
    pub async fn new(
        registry: Arc<EnvironmentRegistry>,
        tunnels: Arc<TunnelCoordinator>,
        jobs: Arc<EdgeJobDispatcher>,
        credentials: Arc<CredentialIssuer>,
        settings_store: Arc<dyn SettingsStore>,
        edge_key: EdgeKeyConfig,
    ) -> Result<Self, ServiceError> {
        let settings = settings_store.settings().await?;
        tunnels.set_keep_alive_duration(Duration::from_secs(u64::from(
            settings.tunnel_keep_alive_secs,
        )));

        Ok(Self {
            registry,
            tunnels,
            jobs,
            credentials,
            settings_store,
            settings: RwLock::new(settings),
            edge_key,
        })
    }

    pub fn registry(&self) -> &Arc<EnvironmentRegistry> {
        &self.registry
    }

    pub fn tunnels(&self) -> &Arc<TunnelCoordinator> {
        &self.tunnels
    }

    fn ensure_known(&self, environment_id: EnvironmentId) -> Result<(), ServiceError> {
        if self.registry.contains(environment_id) {
            Ok(())
        } else {
            Err(RegistryError::NotFound(environment_id).into())
        }
    }

    // ----- environments -----

    /// Create an environment; edge environments get an enrollment key
    pub async fn create_environment(
        &self,
        environment: Environment,
    ) -> Result<Environment, ServiceError> {
        let mut created = self.registry.create_environment(environment).await?;

        if created.kind.is_edge() && created.edge_key.is_empty() {
            created.edge_key = self.build_edge_key(created.id);
            created = self
                .registry
                .update_environment(created.id, created)
                .await?;
        }

        Ok(created)
    }

    pub async fn get_environment(
        &self,
        environment_id: EnvironmentId,
    ) -> Result<Environment, ServiceError> {
        self.registry
            .get_environment(environment_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(environment_id).into())
    }

    pub async fn list_environments(&self) -> Result<Vec<Environment>, ServiceError> {
        Ok(self.registry.list_environments().await?)
    }

    pub async fn update_environment(
        &self,
        environment_id: EnvironmentId,
        environment: Environment,
    ) -> Result<Environment, ServiceError> {
        Ok(self
            .registry
            .update_environment(environment_id, environment)
            .await?)
    }

    /// Delete an environment along with its tunnel state and pending jobs
    pub async fn delete_environment(
        &self,
        environment_id: EnvironmentId,
    ) -> Result<(), ServiceError> {
        self.registry.delete_environment(environment_id).await?;
        self.tunnels.invalidate(environment_id);
        self.jobs.forget(environment_id);
        Ok(())
    }

    // ----- agent check-in -----

    /// Handle an agent poll
    ///
    /// Records the heartbeat, refreshes agent metadata when it changed and
    /// advances the tunnel: a Required tunnel becomes Active, an Active one
    /// has its keep-alive extended.
    pub async fn check_in(
        &self,
        edge_id: &str,
        agent: Option<AgentMetadata>,
    ) -> Result<CheckInResponse, ServiceError> {
        let environment_id = self
            .registry
            .lookup_by_edge_id(edge_id)
            .await
            .ok_or_else(|| ServiceError::UnknownEdgeId(edge_id.to_string()))?;

        let environment = self
            .registry
            .record_check_in(environment_id, agent)
            .await
            .map_err(|e| match e {
                RegistryError::NotFound(_) => ServiceError::UnknownEdgeId(edge_id.to_string()),
                other => other.into(),
            })?;

        match self.tunnels.status(environment_id)? {
            TunnelStatus::Required => self.tunnels.set_active(environment_id)?,
            TunnelStatus::Active => {
                self.tunnels
                    .keep_alive(environment_id, self.tunnels.keep_alive_duration())?;
            }
            TunnelStatus::Idle => {}
        }

        let details = self.tunnels.details(environment_id)?;
        let settings = self.settings().await;

        Ok(CheckInResponse {
            environment_id,
            status: details.status,
            port: details.port,
            credentials: details.credentials,
            checkin_interval: effective_checkin_interval(&environment, &settings),
            schedules: details
                .jobs
                .iter()
                .map(|job| job.schedule_for(environment_id))
                .collect(),
        })
    }

    /// Keep an active tunnel open on observed data flow
    pub fn record_tunnel_activity(&self, environment_id: EnvironmentId) -> Result<bool, ServiceError> {
        Ok(self
            .tunnels
            .keep_alive(environment_id, self.tunnels.keep_alive_duration())?)
    }

    // ----- operator tunnel controls -----

    pub fn require_tunnel(&self, environment_id: EnvironmentId) -> Result<TunnelDetails, ServiceError> {
        self.tunnels.set_required(environment_id)?;
        Ok(self.tunnels.details(environment_id)?)
    }

    pub fn stop_tunnel(&self, environment_id: EnvironmentId) -> Result<(), ServiceError> {
        Ok(self.tunnels.set_idle(environment_id)?)
    }

    pub fn tunnel_status(&self, environment_id: EnvironmentId) -> Result<TunnelStatus, ServiceError> {
        Ok(self.tunnels.status(environment_id)?)
    }

    pub fn tunnel_details(
        &self,
        environment_id: EnvironmentId,
    ) -> Result<TunnelDetails, ServiceError> {
        Ok(self.tunnels.details(environment_id)?)
    }

    /// Wait for the agent to open its tunnel, requesting one if idle
    ///
    /// Waits for two check-in intervals of the environment.
    pub async fn active_tunnel(
        &self,
        environment_id: EnvironmentId,
    ) -> Result<TunnelDetails, ServiceError> {
        let environment = self.get_environment(environment_id).await?;
        let settings = self.settings().await;
        let interval = effective_checkin_interval(&environment, &settings);
        let wait = Duration::from_secs(u64::from(interval) * 2);

        Ok(self.tunnels.active_tunnel(environment_id, wait).await?)
    }

    /// Check a token presented by an agent opening its tunnel
    pub fn verify_tunnel_credentials(
        &self,
        environment_id: EnvironmentId,
        token: &str,
    ) -> Result<TunnelClaims, ServiceError> {
        Ok(self.credentials.verify(token, environment_id)?)
    }

    // ----- edge jobs -----

    pub fn attach_job(&self, environment_id: EnvironmentId, job: EdgeJob) -> Result<(), ServiceError> {
        self.ensure_known(environment_id)?;
        self.jobs.attach(environment_id, job);
        Ok(())
    }

    pub fn detach_job(&self, job_id: EdgeJobId) {
        self.jobs.detach(job_id);
    }

    pub fn pending_jobs(&self, environment_id: EnvironmentId) -> Vec<EdgeJob> {
        self.jobs.pending_for(environment_id)
    }

    pub fn acknowledge_job(&self, environment_id: EnvironmentId, job_id: EdgeJobId) -> bool {
        self.jobs.acknowledge(environment_id, job_id)
    }

    // ----- enrollment keys -----

    fn build_edge_key(&self, environment_id: EnvironmentId) -> String {
        EdgeKey::new(
            &self.edge_key.api_url,
            &self.edge_key.tunnel_addr,
            &self.edge_key.fingerprint,
            environment_id,
        )
        .encode()
    }

    /// Enrollment key for an existing environment
    pub fn edge_key_for(&self, environment_id: EnvironmentId) -> Result<String, ServiceError> {
        self.ensure_known(environment_id)?;
        Ok(self.build_edge_key(environment_id))
    }

    pub fn parse_edge_key(key: &str) -> Result<EdgeKey, ServiceError> {
        Ok(EdgeKey::decode(key)?)
    }

    // ----- settings -----

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Persist new settings and apply the keep-alive to future activity
    pub async fn update_settings(&self, settings: Settings) -> Result<(), ServiceError> {
        self.settings_store.update_settings(&settings).await?;
        self.tunnels.set_keep_alive_duration(Duration::from_secs(u64::from(
            settings.tunnel_keep_alive_secs,
        )));

        info!(
            checkin_interval = settings.edge_agent_checkin_interval,
            keep_alive_secs = settings.tunnel_keep_alive_secs,
            "Settings updated"
        );
        *self.settings.write().await = settings;
        Ok(())
    }
}

/// Environment's own interval when set, otherwise the server default
fn effective_checkin_interval(environment: &Environment, settings: &Settings) -> u32 {
    if environment.edge_checkin_interval > 0 {
        environment.edge_checkin_interval
    } else {
        settings.edge_agent_checkin_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeward_proto::EnvironmentType;

    #[test]
    fn test_effective_checkin_interval() {
        let settings = Settings::default();
        let mut environment = Environment::new("edge", EnvironmentType::EdgeAgentOnDocker);

        assert_eq!(effective_checkin_interval(&environment, &settings), 5);

        environment.edge_checkin_interval = 30;
        assert_eq!(effective_checkin_interval(&environment, &settings), 30);
    }
}
