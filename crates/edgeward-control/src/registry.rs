//! Environment registry
//!
//! Owns two indices derived from the persisted environment set:
//! - edge ID -> environment ID, one-to-one, behind a single exclusive lock
//! - environment ID -> last heartbeat (Unix seconds), a sharded concurrent map
//!
//! The heartbeat cache is authoritative for liveness reads: listings overlay
//! it on top of whatever the store last persisted.

use crate::error::RegistryError;
use crate::tunnel::KnownEnvironments;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use edgeward_proto::{AgentMetadata, Environment, EnvironmentId};
use edgeward_store::EnvironmentStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Registry of environments with edge-ID lookup and heartbeat cache
pub struct EnvironmentRegistry {
    store: Arc<dyn EnvironmentStore>,
    /// Held for writing across store calls that change the edge-ID set,
    /// so two creates cannot both claim one edge ID
    edge_index: RwLock<HashMap<String, EnvironmentId>>,
    heartbeats: DashMap<EnvironmentId, i64>,
    known: DashSet<EnvironmentId>,
}

impl EnvironmentRegistry {
    pub fn new(store: Arc<dyn EnvironmentStore>) -> Self {
        Self {
            store,
            edge_index: RwLock::new(HashMap::new()),
            heartbeats: DashMap::new(),
            known: DashSet::new(),
        }
    }

    /// Rebuild the indices from a full store scan
    ///
    /// Must complete before the registry serves lookups. A failed scan leaves
    /// the previous indices untouched and is fatal to the caller at startup.
    /// Heartbeats already observed by this process are kept when newer than
    /// the persisted value.
    pub async fn initialize(&self) -> Result<(), RegistryError> {
        let mut index = self.edge_index.write().await;

        let environments = self
            .store
            .scan_all()
            .await
            .map_err(RegistryError::StoreUnavailable)?;

        index.clear();
        self.known.clear();

        for environment in &environments {
            self.known.insert(environment.id);
            self.seed_heartbeat(environment.id, environment.last_check_in_date);

            let Some(edge_id) = environment.edge_id() else {
                continue;
            };

            if let Some(existing) = index.get(edge_id) {
                warn!(
                    edge_id = %edge_id,
                    environment_id = %environment.id,
                    existing = %existing,
                    "Duplicate edge ID in store, keeping first environment"
                );
                continue;
            }
            index.insert(edge_id.to_string(), environment.id);
        }

        info!(
            environments = environments.len(),
            edge_agents = index.len(),
            "Environment registry initialized"
        );

        Ok(())
    }

    /// Resolve an edge ID without touching the store
    pub async fn lookup_by_edge_id(&self, edge_id: &str) -> Option<EnvironmentId> {
        self.edge_index.read().await.get(edge_id).copied()
    }

    /// Record that an environment was seen alive now
    pub fn record_heartbeat(&self, environment_id: EnvironmentId) -> i64 {
        let now = Utc::now().timestamp();
        self.heartbeats.insert(environment_id, now);
        now
    }

    /// Record an agent poll and refresh its metadata when it changed
    ///
    /// Runs under the edge-index read lock so it cannot interleave with an
    /// operator update or a delete of the same environment. A deleted
    /// environment gets no heartbeat.
    pub async fn record_check_in(
        &self,
        environment_id: EnvironmentId,
        agent: Option<AgentMetadata>,
    ) -> Result<Environment, RegistryError> {
        let _index = self.edge_index.read().await;

        let mut environment = self
            .store
            .environment(environment_id)
            .await?
            .ok_or(RegistryError::NotFound(environment_id))?;

        let heartbeat = self.record_heartbeat(environment_id);

        if let Some(agent) = agent.filter(|agent| *agent != environment.agent) {
            debug!(
                environment_id = %environment_id,
                platform = %agent.platform,
                version = %agent.version,
                "Agent metadata changed"
            );
            environment.agent = agent;
            environment.last_check_in_date = heartbeat;
            environment = self.store.save(&environment).await?;
        }

        Ok(self.overlay(environment))
    }

    /// Last heartbeat, `None` if never seen since process start
    pub fn get_heartbeat(&self, environment_id: EnvironmentId) -> Option<i64> {
        self.heartbeats.get(&environment_id).map(|t| *t)
    }

    pub async fn get_environment(
        &self,
        environment_id: EnvironmentId,
    ) -> Result<Option<Environment>, RegistryError> {
        let environment = self.store.environment(environment_id).await?;
        Ok(environment.map(|environment| self.overlay(environment)))
    }

    /// Fresh listing from the store with cached heartbeats applied
    pub async fn list_environments(&self) -> Result<Vec<Environment>, RegistryError> {
        let environments = self.store.scan_all().await?;
        Ok(environments
            .into_iter()
            .map(|environment| self.overlay(environment))
            .collect())
    }

    /// Persist a new environment and index it
    ///
    /// An edge ID already bound to another environment is rejected before
    /// the store is written.
    pub async fn create_environment(
        &self,
        environment: Environment,
    ) -> Result<Environment, RegistryError> {
        let environment = environment.normalize();
        let mut index = self.edge_index.write().await;

        if let Some(edge_id) = environment.edge_id() {
            if let Some(&existing) = index.get(edge_id) {
                return Err(RegistryError::EdgeIdConflict {
                    edge_id: edge_id.to_string(),
                    existing,
                });
            }
        }

        let stored = self.store.insert(&environment).await?;

        if let Some(edge_id) = stored.edge_id() {
            index.insert(edge_id.to_string(), stored.id);
        }
        drop(index);

        self.known.insert(stored.id);
        self.seed_heartbeat(stored.id, stored.last_check_in_date);

        info!(
            environment_id = %stored.id,
            name = %stored.name,
            edge_id = stored.edge_id().unwrap_or("-"),
            "Created environment"
        );

        Ok(stored)
    }

    /// Replace a stored environment, re-indexing its edge ID if it changed
    pub async fn update_environment(
        &self,
        environment_id: EnvironmentId,
        mut environment: Environment,
    ) -> Result<Environment, RegistryError> {
        environment.id = environment_id;
        let environment = environment.normalize();
        let mut index = self.edge_index.write().await;

        let previous = self
            .store
            .environment(environment_id)
            .await?
            .ok_or(RegistryError::NotFound(environment_id))?;

        let old_edge_id = previous.edge_id().map(str::to_string);
        let new_edge_id = environment.edge_id().map(str::to_string);

        if let Some(edge_id) = new_edge_id.as_deref() {
            if let Some(&existing) = index.get(edge_id) {
                if existing != environment_id {
                    return Err(RegistryError::EdgeIdConflict {
                        edge_id: edge_id.to_string(),
                        existing,
                    });
                }
            }
        }

        let stored = self.store.save(&environment).await?;

        if old_edge_id != new_edge_id {
            warn!(
                environment_id = %environment_id,
                old_edge_id = old_edge_id.as_deref().unwrap_or("-"),
                new_edge_id = new_edge_id.as_deref().unwrap_or("-"),
                "Edge ID changed, re-indexing"
            );
            if let Some(old) = old_edge_id.as_deref() {
                if index.get(old) == Some(&environment_id) {
                    index.remove(old);
                }
            }
            if let Some(new) = new_edge_id {
                index.insert(new, environment_id);
            }
        }
        drop(index);

        self.known.insert(environment_id);
        self.seed_heartbeat(environment_id, stored.last_check_in_date);
        debug!(environment_id = %environment_id, "Updated environment");

        Ok(self.overlay(stored))
    }

    /// Delete from the store and purge every index entry for the ID
    pub async fn delete_environment(
        &self,
        environment_id: EnvironmentId,
    ) -> Result<(), RegistryError> {
        let mut index = self.edge_index.write().await;

        self.store.delete(environment_id).await?;

        index.retain(|_, id| *id != environment_id);
        drop(index);

        self.heartbeats.remove(&environment_id);
        self.known.remove(&environment_id);

        info!(environment_id = %environment_id, "Deleted environment");
        Ok(())
    }

    /// Number of environments known to the registry
    pub fn count(&self) -> usize {
        self.known.len()
    }

    fn seed_heartbeat(&self, environment_id: EnvironmentId, persisted: i64) {
        self.heartbeats
            .entry(environment_id)
            .and_modify(|cached| *cached = (*cached).max(persisted))
            .or_insert(persisted);
    }

    fn overlay(&self, mut environment: Environment) -> Environment {
        if let Some(heartbeat) = self.get_heartbeat(environment.id) {
            environment.last_check_in_date = heartbeat;
        }
        environment
    }
}

impl KnownEnvironments for EnvironmentRegistry {
    fn contains(&self, environment_id: EnvironmentId) -> bool {
        self.known.contains(&environment_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use edgeward_proto::EnvironmentType;
    use edgeward_store::StoreError;
    use mockall::mock;

    mock! {
        pub Store {}

        #[async_trait]
        impl EnvironmentStore for Store {
            async fn environment(&self, id: EnvironmentId) -> Result<Option<Environment>, StoreError>;
            async fn insert(&self, environment: &Environment) -> Result<Environment, StoreError>;
            async fn save(&self, environment: &Environment) -> Result<Environment, StoreError>;
            async fn delete(&self, id: EnvironmentId) -> Result<(), StoreError>;
            async fn scan_all(&self) -> Result<Vec<Environment>, StoreError>;
        }
    }

    fn edge_environment(id: i32, edge_id: &str) -> Environment {
        Environment::new(format!("edge-{}", id), EnvironmentType::EdgeAgentOnDocker)
            .with_id(id)
            .with_edge_id(edge_id)
    }

    #[tokio::test]
    async fn test_initialize_fails_when_store_unavailable() {
        let mut store = MockStore::new();
        store
            .expect_scan_all()
            .returning(|| Err(StoreError::Corrupt("disk gone".into())));

        let registry = EnvironmentRegistry::new(Arc::new(store));
        let result = registry.initialize().await;

        assert!(matches!(result, Err(RegistryError::StoreUnavailable(_))));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_initialize_indexes_edge_ids_and_seeds_heartbeats() {
        let mut store = MockStore::new();
        store.expect_scan_all().returning(|| {
            let mut first = edge_environment(1, "edge-aaa");
            first.last_check_in_date = 1_700_000_000;
            let plain = Environment::new("local", EnvironmentType::Docker).with_id(2);
            let duplicate = edge_environment(3, "edge-aaa");
            Ok(vec![first, plain, duplicate])
        });

        let registry = EnvironmentRegistry::new(Arc::new(store));
        registry.initialize().await.unwrap();

        assert_eq!(
            registry.lookup_by_edge_id("edge-aaa").await,
            Some(EnvironmentId(1))
        );
        assert_eq!(registry.get_heartbeat(EnvironmentId(1)), Some(1_700_000_000));
        assert_eq!(registry.get_heartbeat(EnvironmentId(2)), Some(0));
        assert_eq!(registry.get_heartbeat(EnvironmentId(99)), None);
        assert!(registry.contains(EnvironmentId(3)));
        assert_eq!(registry.count(), 3);
    }

    #[tokio::test]
    async fn test_reinitialize_keeps_newer_cached_heartbeat() {
        let mut store = MockStore::new();
        store
            .expect_scan_all()
            .returning(|| Ok(vec![edge_environment(1, "edge-aaa")]));

        let registry = EnvironmentRegistry::new(Arc::new(store));
        registry.initialize().await.unwrap();
        let recorded = registry.record_heartbeat(EnvironmentId(1));

        registry.initialize().await.unwrap();
        assert_eq!(registry.get_heartbeat(EnvironmentId(1)), Some(recorded));
    }

    #[tokio::test]
    async fn test_conflicting_edge_id_rejected_before_store_write() {
        let mut store = MockStore::new();
        store
            .expect_scan_all()
            .returning(|| Ok(vec![edge_environment(1, "edge-aaa")]));
        store.expect_insert().never();

        let registry = EnvironmentRegistry::new(Arc::new(store));
        registry.initialize().await.unwrap();

        let result = registry
            .create_environment(edge_environment(0, "edge-aaa"))
            .await;

        match result {
            Err(RegistryError::EdgeIdConflict { edge_id, existing }) => {
                assert_eq!(edge_id, "edge-aaa");
                assert_eq!(existing, EnvironmentId(1));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_crud_store_failure_is_recoverable() {
        let mut store = MockStore::new();
        store.expect_scan_all().returning(|| Ok(vec![]));
        store
            .expect_insert()
            .returning(|_| Err(StoreError::Corrupt("constraint".into())));

        let registry = EnvironmentRegistry::new(Arc::new(store));
        registry.initialize().await.unwrap();

        let result = registry
            .create_environment(edge_environment(0, "edge-bbb"))
            .await;
        assert!(matches!(result, Err(RegistryError::StoreUnavailable(_))));

        // Nothing was indexed for the failed create
        assert_eq!(registry.lookup_by_edge_id("edge-bbb").await, None);
    }

    #[tokio::test]
    async fn test_delete_missing_environment_is_not_found() {
        let mut store = MockStore::new();
        store
            .expect_delete()
            .returning(|id| Err(StoreError::NotFound(id)));

        let registry = EnvironmentRegistry::new(Arc::new(store));
        let result = registry.delete_environment(EnvironmentId(42)).await;

        assert!(matches!(
            result,
            Err(RegistryError::NotFound(EnvironmentId(42)))
        ));
    }

    fn agent(version: &str) -> AgentMetadata {
        AgentMetadata {
            platform: "linux".into(),
            version: version.into(),
        }
    }

    #[tokio::test]
    async fn test_check_in_after_delete_records_no_heartbeat() {
        let mut store = MockStore::new();
        store.expect_environment().returning(|_| Ok(None));
        store.expect_save().never();

        let registry = EnvironmentRegistry::new(Arc::new(store));
        let result = registry
            .record_check_in(EnvironmentId(5), Some(agent("2.0")))
            .await;

        assert!(matches!(
            result,
            Err(RegistryError::NotFound(EnvironmentId(5)))
        ));
        assert_eq!(registry.get_heartbeat(EnvironmentId(5)), None);
    }

    #[tokio::test]
    async fn test_check_in_with_unchanged_agent_skips_store_write() {
        let mut store = MockStore::new();
        store.expect_environment().returning(|id| {
            let mut environment = edge_environment(id.0, "edge-ccc");
            environment.agent = agent("2.0");
            Ok(Some(environment))
        });
        store.expect_save().never();

        let registry = EnvironmentRegistry::new(Arc::new(store));
        let environment = registry
            .record_check_in(EnvironmentId(5), Some(agent("2.0")))
            .await
            .unwrap();

        assert_eq!(
            registry.get_heartbeat(EnvironmentId(5)),
            Some(environment.last_check_in_date)
        );
    }

    #[tokio::test]
    async fn test_check_in_saves_changed_agent_over_fresh_record() {
        let mut store = MockStore::new();
        store.expect_environment().returning(|id| {
            let mut environment = edge_environment(id.0, "edge-ccc");
            environment.name = "renamed-by-operator".into();
            environment.agent = agent("1.0");
            Ok(Some(environment))
        });
        store
            .expect_save()
            .times(1)
            .withf(|environment| {
                environment.name == "renamed-by-operator" && environment.agent.version == "2.0"
            })
            .returning(|environment| Ok(environment.clone()));

        let registry = EnvironmentRegistry::new(Arc::new(store));
        let environment = registry
            .record_check_in(EnvironmentId(5), Some(agent("2.0")))
            .await
            .unwrap();

        assert_eq!(environment.agent, agent("2.0"));
    }

    #[tokio::test]
    async fn test_heartbeats_are_non_decreasing() {
        let registry = EnvironmentRegistry::new(Arc::new(MockStore::new()));

        let before = Utc::now().timestamp();
        let first = registry.record_heartbeat(EnvironmentId(7));
        let second = registry.record_heartbeat(EnvironmentId(7));

        assert!(first >= before);
        assert!(second >= first);
        assert_eq!(registry.get_heartbeat(EnvironmentId(7)), Some(second));
    }
}
