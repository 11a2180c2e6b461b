//! Vote, voter and tally repository.

use std::sync::Arc;

use cinekami_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait, QueryFilter,
    QuerySelect, Statement,
};
use tracing::debug;

use crate::entities::{Tally, VoteCategory, tally};
use crate::models::TallyMap;

/// Repository for votes and their derived counters.
#[derive(Clone)]
pub struct VoteRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteRepository {
    /// Create a new vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Get or create the voter for a fingerprint.
    ///
    /// The no-op update makes `RETURNING` yield the existing row on conflict.
    pub async fn get_or_create_voter(&self, fingerprint: &str) -> AppResult<i64> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                "INSERT INTO voter (fingerprint) VALUES ($1)
                 ON CONFLICT (fingerprint) DO UPDATE SET fingerprint = EXCLUDED.fingerprint
                 RETURNING id",
                [fingerprint.into()],
            ))
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?
            .ok_or_else(|| AppError::StorageUnavailable("voter upsert returned no row".to_string()))?;

        row.try_get::<i64>("", "id")
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))
    }

    /// Insert a vote; `false` when the voter already voted on the movie.
    pub async fn insert_if_absent(
        &self,
        movie_id: i64,
        voter_id: i64,
        category: VoteCategory,
    ) -> AppResult<bool> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                "INSERT INTO vote (movie_id, voter_id, category) VALUES ($1, $2, $3)
                 ON CONFLICT (movie_id, voter_id) DO NOTHING
                 RETURNING id",
                [movie_id.into(), voter_id.into(), category.as_str().into()],
            ))
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;

        let inserted = row.is_some();
        debug!(movie_id, voter_id, %category, inserted, "Vote insert");
        Ok(inserted)
    }

    /// Atomically add one to a tally counter, creating it at one.
    pub async fn increment_tally(&self, movie_id: i64, category: VoteCategory) -> AppResult<()> {
        self.db
            .execute(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                "INSERT INTO tally (movie_id, category, count) VALUES ($1, $2, 1)
                 ON CONFLICT (movie_id, category) DO UPDATE SET count = tally.count + 1",
                [movie_id.into(), category.as_str().into()],
            ))
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Zero-filled counters of a movie.
    pub async fn tallies(&self, movie_id: i64) -> AppResult<TallyMap> {
        let rows = Tally::find()
            .select_only()
            .column(tally::Column::Category)
            .column(tally::Column::Count)
            .filter(tally::Column::MovieId.eq(movie_id))
            .into_tuple::<(String, i64)>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;

        Ok(TallyMap::from_counts(
            rows.iter().map(|(category, count)| (category.as_str(), *count)),
        ))
    }

    /// Category a fingerprint voted for on a movie.
    pub async fn voter_category(
        &self,
        movie_id: i64,
        fingerprint: &str,
    ) -> AppResult<Option<VoteCategory>> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                "SELECT v.category FROM vote v
                 JOIN voter r ON r.id = v.voter_id
                 WHERE v.movie_id = $1 AND r.fingerprint = $2",
                [movie_id.into(), fingerprint.into()],
            ))
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let category = row
            .try_get::<String>("", "category")
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;
        Ok(category.parse().ok())
    }
}
