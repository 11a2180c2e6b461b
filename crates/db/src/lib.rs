//! Database layer for cinekami-rs.
//!
//! Entities and migrations for PostgreSQL, the storage traits the services
//! depend on, and two implementations of them: [`PgStorage`] and
//! [`MemoryStorage`].

pub mod entities;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod repositories;
pub mod store;
pub mod test_utils;

pub use entities::VoteCategory;
pub use memory::MemoryStorage;
pub use models::{
    CatalogMovie, Keyset, Movie, MovieListItem, MovieScan, PopularityBounds, SnapshotListItem,
    SnapshotRecord, SnapshotScan, SortDir, SortField, TallyKeyset, TallyMap, TallyRow, YearMonth,
};
pub use repositories::PgStorage;
pub use store::{MovieStore, SnapshotStore, Storage, VoteStore};

use cinekami_common::{AppError, Config};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::log::LevelFilter;

/// Initialize database connection.
pub async fn init(config: &Config) -> Result<DatabaseConnection, AppError> {
    let mut opt = ConnectOptions::new(&config.database.url);

    opt.max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(true)
        .sqlx_logging_level(LevelFilter::Debug);

    Database::connect(opt)
        .await
        .map_err(|e| AppError::StorageUnavailable(e.to_string()))
}

/// Run pending migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), AppError> {
    use sea_orm_migration::MigratorTrait;
    migrations::Migrator::up(db, None)
        .await
        .map_err(|e| AppError::StorageUnavailable(e.to_string()))
}
