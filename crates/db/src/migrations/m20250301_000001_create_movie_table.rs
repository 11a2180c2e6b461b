//! Create movie table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Movie::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Movie::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Movie::Title).text().not_null())
                    .col(ColumnDef::new(Movie::ReleaseDate).date().not_null())
                    .col(ColumnDef::new(Movie::Overview).text())
                    .col(ColumnDef::new(Movie::PosterPath).string_len(256))
                    .col(ColumnDef::new(Movie::BackdropPath).string_len(256))
                    .col(
                        ColumnDef::new(Movie::Popularity)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(Movie::ImdbUrl).string_len(512))
                    .col(ColumnDef::new(Movie::CinemagiaUrl).string_len(512))
                    .col(
                        ColumnDef::new(Movie::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Movie::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: release_date (active window and archival lookups)
        manager
            .create_index(
                Index::create()
                    .name("idx_movie_release_date")
                    .table(Movie::Table)
                    .col(Movie::ReleaseDate)
                    .to_owned(),
            )
            .await?;

        // Index: (popularity, id) for keyset scans
        manager
            .create_index(
                Index::create()
                    .name("idx_movie_popularity_id")
                    .table(Movie::Table)
                    .col(Movie::Popularity)
                    .col(Movie::Id)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Movie::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Movie {
    Table,
    Id,
    Title,
    ReleaseDate,
    Overview,
    PosterPath,
    BackdropPath,
    Popularity,
    ImdbUrl,
    CinemagiaUrl,
    CreatedAt,
    UpdatedAt,
}
