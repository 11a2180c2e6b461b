//! Create tally table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tally::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tally::MovieId).big_integer().not_null())
                    .col(ColumnDef::new(Tally::Category).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Tally::Count)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Tally::Count).gte(0)),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_tally")
                            .col(Tally::MovieId)
                            .col(Tally::Category),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tally_movie")
                            .from(Tally::Table, Tally::MovieId)
                            .to(Movie::Table, Movie::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tally::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Tally {
    Table,
    MovieId,
    Category,
    Count,
}

#[derive(Iden)]
enum Movie {
    Table,
    Id,
}
