//! Create the single-row settings table

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Settings::Table)
                    .if_not_exists()
                    .col(integer(Settings::Id).not_null().primary_key())
                    .col(
                        integer(Settings::EdgeAgentCheckinInterval)
                            .not_null()
                            .default(5),
                    )
                    .col(
                        integer(Settings::TunnelKeepAliveSecs)
                            .not_null()
                            .default(300),
                    )
                    .col(
                        timestamp_with_time_zone(Settings::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Settings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Settings {
    Table,
    Id,
    EdgeAgentCheckinInterval,
    TunnelKeepAliveSecs,
    UpdatedAt,
}
