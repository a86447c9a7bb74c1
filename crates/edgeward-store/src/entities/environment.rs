//! Environment entity: one row per registered Docker/Kubernetes target

use edgeward_proto::{
    AgentMetadata, EdgeSettings, Environment as EnvironmentRecord, EnvironmentId,
    EnvironmentStatus, EnvironmentType,
};
use sea_orm::entity::prelude::*;
use sea_orm::{NotSet, Set};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "environments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    /// `EnvironmentType` code
    pub environment_type: i32,

    pub url: String,

    pub public_url: String,

    pub group_id: i32,

    /// `EnvironmentStatus` code
    pub status: i32,

    /// Edge agent identifier, unique when present
    #[sea_orm(unique)]
    pub edge_id: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub edge_key: String,

    pub edge_checkin_interval: i32,

    /// Last persisted check-in (Unix seconds)
    pub last_check_in_date: i64,

    pub agent_platform: String,

    pub agent_version: String,

    pub edge_async_mode: bool,

    pub edge_ping_interval: i32,

    pub edge_snapshot_interval: i32,

    pub edge_command_interval: i32,

    pub is_edge_device: bool,

    pub user_trusted: bool,

    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn to_column(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn from_column(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

impl TryFrom<Model> for EnvironmentRecord {
    type Error = StoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let kind = EnvironmentType::try_from(model.environment_type)
            .map_err(|e| StoreError::Corrupt(format!("environment {}: {}", model.id, e)))?;
        let status = EnvironmentStatus::try_from(model.status)
            .map_err(|e| StoreError::Corrupt(format!("environment {}: {}", model.id, e)))?;

        Ok(EnvironmentRecord {
            id: EnvironmentId(model.id),
            name: model.name,
            kind,
            url: model.url,
            public_url: model.public_url,
            group_id: model.group_id,
            status,
            edge_id: model.edge_id.filter(|id| !id.is_empty()),
            edge_key: model.edge_key,
            edge_checkin_interval: from_column(model.edge_checkin_interval),
            last_check_in_date: model.last_check_in_date,
            agent: AgentMetadata {
                platform: model.agent_platform,
                version: model.agent_version,
            },
            edge: EdgeSettings {
                async_mode: model.edge_async_mode,
                ping_interval: from_column(model.edge_ping_interval),
                snapshot_interval: from_column(model.edge_snapshot_interval),
                command_interval: from_column(model.edge_command_interval),
            },
            is_edge_device: model.is_edge_device,
            user_trusted: model.user_trusted,
        })
    }
}

/// Build an active model from a record
///
/// An unassigned ID is left `NotSet` so the database numbers the row.
/// `created_at` is never written here: inserts take the column default and
/// updates keep the original value.
pub fn active_model(record: &EnvironmentRecord) -> ActiveModel {
    ActiveModel {
        id: if record.id.is_assigned() {
            Set(record.id.0)
        } else {
            NotSet
        },
        name: Set(record.name.clone()),
        environment_type: Set(record.kind.code()),
        url: Set(record.url.clone()),
        public_url: Set(record.public_url.clone()),
        group_id: Set(record.group_id),
        status: Set(record.status.code()),
        edge_id: Set(record.edge_id().map(str::to_string)),
        edge_key: Set(record.edge_key.clone()),
        edge_checkin_interval: Set(to_column(record.edge_checkin_interval)),
        last_check_in_date: Set(record.last_check_in_date),
        agent_platform: Set(record.agent.platform.clone()),
        agent_version: Set(record.agent.version.clone()),
        edge_async_mode: Set(record.edge.async_mode),
        edge_ping_interval: Set(to_column(record.edge.ping_interval)),
        edge_snapshot_interval: Set(to_column(record.edge.snapshot_interval)),
        edge_command_interval: Set(to_column(record.edge.command_interval)),
        is_edge_device: Set(record.is_edge_device),
        user_trusted: Set(record.user_trusted),
        created_at: NotSet,
    }
}
