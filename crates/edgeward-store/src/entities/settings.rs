//! Settings entity: a single row (id = 1) of server-wide edge settings

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Primary key of the only settings row
pub const SETTINGS_ID: i32 = 1;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,

    /// Default check-in interval for edge agents (seconds)
    pub edge_agent_checkin_interval: i32,

    /// Keep-alive applied to active tunnels (seconds)
    pub tunnel_keep_alive_secs: i32,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
