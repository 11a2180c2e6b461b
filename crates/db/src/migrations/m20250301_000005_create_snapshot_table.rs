//! Create snapshot table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Snapshot::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Snapshot::Month).char_len(7).not_null())
                    .col(ColumnDef::new(Snapshot::MovieId).big_integer().not_null())
                    .col(ColumnDef::new(Snapshot::Tallies).json_binary().not_null())
                    .col(
                        ColumnDef::new(Snapshot::ClosedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_snapshot")
                            .col(Snapshot::Month)
                            .col(Snapshot::MovieId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_snapshot_movie")
                            .from(Snapshot::Table, Snapshot::MovieId)
                            .to(Movie::Table, Movie::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Snapshot::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Snapshot {
    Table,
    Month,
    MovieId,
    Tallies,
    ClosedAt,
}

#[derive(Iden)]
enum Movie {
    Table,
    Id,
}
