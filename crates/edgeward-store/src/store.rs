//! Environment store trait and its SeaORM implementation

use async_trait::async_trait;
use chrono::Utc;
use edgeward_proto::{Environment, EnvironmentId};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use tracing::debug;

use crate::entities::environment::{self, active_model};
use crate::entities::settings::{self, SETTINGS_ID};
use crate::error::StoreError;
use crate::settings::{Settings, SettingsStore};

/// Persistent storage of environment records
///
/// Implementations only persist; they keep no indices of their own.
#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    /// Fetch one environment by ID
    async fn environment(&self, id: EnvironmentId) -> Result<Option<Environment>, StoreError>;

    /// Insert a new environment
    ///
    /// A record carrying `EnvironmentId::UNASSIGNED` gets the next free ID.
    /// Fails with `AlreadyExists` when an explicit ID is taken.
    async fn insert(&self, environment: &Environment) -> Result<Environment, StoreError>;

    /// Insert-or-replace keyed by ID
    async fn save(&self, environment: &Environment) -> Result<Environment, StoreError>;

    /// Delete an environment, `NotFound` when absent
    async fn delete(&self, id: EnvironmentId) -> Result<(), StoreError>;

    /// Full scan ordered by ID
    async fn scan_all(&self) -> Result<Vec<Environment>, StoreError>;
}

/// SeaORM-backed store for environments and settings
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn find_model(
        &self,
        id: EnvironmentId,
    ) -> Result<Option<environment::Model>, StoreError> {
        Ok(environment::Entity::find_by_id(id.0).one(&self.db).await?)
    }

    async fn insert_model(&self, record: &Environment) -> Result<Environment, StoreError> {
        let result = environment::Entity::insert(active_model(record))
            .exec(&self.db)
            .await?;

        let mut stored = record.clone().normalize();
        stored.id = EnvironmentId(result.last_insert_id);
        debug!(environment_id = %stored.id, "Inserted environment");
        Ok(stored)
    }
}

#[async_trait]
impl EnvironmentStore for SeaOrmStore {
    async fn environment(&self, id: EnvironmentId) -> Result<Option<Environment>, StoreError> {
        self.find_model(id)
            .await?
            .map(Environment::try_from)
            .transpose()
    }

    async fn insert(&self, record: &Environment) -> Result<Environment, StoreError> {
        if record.id.is_assigned() && self.find_model(record.id).await?.is_some() {
            return Err(StoreError::AlreadyExists(record.id));
        }

        self.insert_model(record).await
    }

    async fn save(&self, record: &Environment) -> Result<Environment, StoreError> {
        if !record.id.is_assigned() || self.find_model(record.id).await?.is_none() {
            return self.insert_model(record).await;
        }

        let model = active_model(record).update(&self.db).await?;
        debug!(environment_id = %record.id, "Updated environment");
        Environment::try_from(model)
    }

    async fn delete(&self, id: EnvironmentId) -> Result<(), StoreError> {
        let result = environment::Entity::delete_by_id(id.0)
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(id));
        }

        debug!(environment_id = %id, "Deleted environment");
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<Environment>, StoreError> {
        environment::Entity::find()
            .order_by_asc(environment::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Environment::try_from)
            .collect()
    }
}

#[async_trait]
impl SettingsStore for SeaOrmStore {
    async fn settings(&self) -> Result<Settings, StoreError> {
        let model = settings::Entity::find_by_id(SETTINGS_ID)
            .one(&self.db)
            .await?;

        Ok(match model {
            Some(model) => Settings {
                edge_agent_checkin_interval: u32::try_from(model.edge_agent_checkin_interval)
                    .unwrap_or_default(),
                tunnel_keep_alive_secs: u32::try_from(model.tunnel_keep_alive_secs)
                    .unwrap_or_default(),
            },
            None => Settings::default(),
        })
    }

    async fn update_settings(&self, value: &Settings) -> Result<(), StoreError> {
        let checkin_interval = i32::try_from(value.edge_agent_checkin_interval).unwrap_or(i32::MAX);
        let keep_alive = i32::try_from(value.tunnel_keep_alive_secs).unwrap_or(i32::MAX);

        let model = settings::ActiveModel {
            id: Set(SETTINGS_ID),
            edge_agent_checkin_interval: Set(checkin_interval),
            tunnel_keep_alive_secs: Set(keep_alive),
            updated_at: Set(Utc::now()),
        };

        let exists = settings::Entity::find_by_id(SETTINGS_ID)
            .one(&self.db)
            .await?
            .is_some();

        if exists {
            model.update(&self.db).await?;
        } else {
            model.insert(&self.db).await?;
        }

        Ok(())
    }
}
