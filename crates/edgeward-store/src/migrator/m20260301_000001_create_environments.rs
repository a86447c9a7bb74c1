//! Create the environments table with a unique edge_id index

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Environments::Table)
                    .if_not_exists()
                    .col(pk_auto(Environments::Id))
                    .col(string_len(Environments::Name, 255).not_null())
                    .col(integer(Environments::EnvironmentType).not_null())
                    .col(string(Environments::Url).not_null().default(""))
                    .col(string(Environments::PublicUrl).not_null().default(""))
                    .col(integer(Environments::GroupId).not_null().default(1))
                    .col(integer(Environments::Status).not_null().default(1))
                    .col(string_len_null(Environments::EdgeId, 255))
                    .col(text(Environments::EdgeKey).not_null().default(""))
                    .col(
                        integer(Environments::EdgeCheckinInterval)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        big_integer(Environments::LastCheckInDate)
                            .not_null()
                            .default(0),
                    )
                    .col(string(Environments::AgentPlatform).not_null().default(""))
                    .col(string(Environments::AgentVersion).not_null().default(""))
                    .col(
                        boolean(Environments::EdgeAsyncMode)
                            .not_null()
                            .default(false),
                    )
                    .col(integer(Environments::EdgePingInterval).not_null().default(0))
                    .col(
                        integer(Environments::EdgeSnapshotInterval)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        integer(Environments::EdgeCommandInterval)
                            .not_null()
                            .default(0),
                    )
                    .col(boolean(Environments::IsEdgeDevice).not_null().default(false))
                    .col(boolean(Environments::UserTrusted).not_null().default(false))
                    .col(
                        timestamp_with_time_zone(Environments::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // NULL edge IDs do not collide, so only enrolled agents are constrained
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_environments_edge_id")
                    .table(Environments::Table)
                    .col(Environments::EdgeId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_environments_edge_id")
                    .table(Environments::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Environments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Environments {
    Table,
    Id,
    Name,
    EnvironmentType,
    Url,
    PublicUrl,
    GroupId,
    Status,
    EdgeId,
    EdgeKey,
    EdgeCheckinInterval,
    LastCheckInDate,
    AgentPlatform,
    AgentVersion,
    EdgeAsyncMode,
    EdgePingInterval,
    EdgeSnapshotInterval,
    EdgeCommandInterval,
    IsEdgeDevice,
    UserTrusted,
    CreatedAt,
}
