//! PostgreSQL repositories.

mod movie;
mod snapshot;
mod vote;

pub use movie::MovieRepository;
pub use snapshot::SnapshotRepository;
pub use vote::VoteRepository;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinekami_common::AppResult;
use sea_orm::{DatabaseConnection, Value};

use crate::entities::VoteCategory;
use crate::models::{
    CatalogMovie, Keyset, Movie, MovieListItem, MovieScan, PopularityBounds, SnapshotListItem,
    SnapshotRecord, SnapshotScan, SortDir, TallyKeyset, TallyMap, TallyRow, YearMonth,
};
use crate::store::{MovieStore, SnapshotStore, VoteStore};

/// Positional bind values for hand-written statements.
#[derive(Debug, Default)]
pub(crate) struct Binds(Vec<Value>);

impl Binds {
    /// Push a value and return its `$n` placeholder.
    pub(crate) fn push(&mut self, value: impl Into<Value>) -> String {
        self.0.push(value.into());
        format!("${}", self.0.len())
    }

    pub(crate) fn into_values(self) -> Vec<Value> {
        self.0
    }
}

/// Row-value keyset predicate: rows strictly after `after` in `dir`.
pub(crate) fn keyset_predicate(
    key_expr: &str,
    id_expr: &str,
    dir: SortDir,
    after: &Keyset,
    binds: &mut Binds,
) -> String {
    let op = match dir {
        SortDir::Asc => ">",
        SortDir::Desc => "<",
    };
    let key = binds.push(after.key);
    let id = binds.push(after.id);
    format!("({key_expr}, {id_expr}) {op} ({key}::float8, {id})")
}

/// Storage backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStorage {
    movies: MovieRepository,
    votes: VoteRepository,
    snapshots: SnapshotRepository,
}

impl PgStorage {
    /// Create storage over a connection pool.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            movies: MovieRepository::new(Arc::clone(&db)),
            votes: VoteRepository::new(Arc::clone(&db)),
            snapshots: SnapshotRepository::new(db),
        }
    }
}

#[async_trait]
impl MovieStore for PgStorage {
    async fn list_active_movies(
        &self,
        month: YearMonth,
        scan: &MovieScan,
    ) -> AppResult<Vec<MovieListItem>> {
        self.movies.list_active(month, scan).await
    }

    async fn count_active_movies(
        &self,
        month: YearMonth,
        bounds: PopularityBounds,
    ) -> AppResult<u64> {
        self.movies.count_active(month, bounds).await
    }

    async fn find_movie(&self, id: i64) -> AppResult<Option<Movie>> {
        self.movies.find_by_id(id).await
    }

    async fn has_movies(&self) -> AppResult<bool> {
        self.movies.has_any().await
    }

    async fn upsert_movie(&self, movie: &CatalogMovie) -> AppResult<()> {
        self.movies.upsert(movie).await
    }

    async fn movie_ids_released_in(&self, month: YearMonth) -> AppResult<Vec<i64>> {
        self.movies.ids_released_in(month).await
    }
}

#[async_trait]
impl VoteStore for PgStorage {
    async fn get_or_create_voter(&self, fingerprint: &str) -> AppResult<i64> {
        self.votes.get_or_create_voter(fingerprint).await
    }

    async fn insert_vote_if_absent(
        &self,
        movie_id: i64,
        voter_id: i64,
        category: VoteCategory,
    ) -> AppResult<bool> {
        self.votes.insert_if_absent(movie_id, voter_id, category).await
    }

    async fn increment_tally(&self, movie_id: i64, category: VoteCategory) -> AppResult<()> {
        self.votes.increment_tally(movie_id, category).await
    }

    async fn tallies(&self, movie_id: i64) -> AppResult<TallyMap> {
        self.votes.tallies(movie_id).await
    }

    async fn list_tallies(
        &self,
        movie_id: i64,
        after: Option<&TallyKeyset>,
        limit: u64,
    ) -> AppResult<Vec<TallyRow>> {
        let tallies = self.votes.tallies(movie_id).await?;
        Ok(tallies.page(after, limit))
    }

    async fn voter_category(
        &self,
        movie_id: i64,
        fingerprint: &str,
    ) -> AppResult<Option<VoteCategory>> {
        self.votes.voter_category(movie_id, fingerprint).await
    }
}

#[async_trait]
impl SnapshotStore for PgStorage {
    async fn upsert_snapshot(
        &self,
        month: YearMonth,
        movie_id: i64,
        tallies: &TallyMap,
        closed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.snapshots
            .upsert(month, movie_id, tallies, closed_at)
            .await
    }

    async fn find_snapshot(
        &self,
        month: YearMonth,
        movie_id: i64,
    ) -> AppResult<Option<SnapshotRecord>> {
        self.snapshots.find(month, movie_id).await
    }

    async fn list_snapshots(
        &self,
        month: YearMonth,
        scan: &SnapshotScan,
    ) -> AppResult<Vec<SnapshotListItem>> {
        self.snapshots.list(month, scan).await
    }

    async fn count_snapshots(&self, month: YearMonth, bounds: PopularityBounds) -> AppResult<u64> {
        self.snapshots.count(month, bounds).await
    }

    async fn available_months(&self) -> AppResult<Vec<YearMonth>> {
        self.snapshots.available_months().await
    }
}
