//! Storage collaborator traits.
//!
//! Services depend on these traits rather than on a concrete backend.
//! [`crate::PgStorage`] implements them over PostgreSQL and
//! [`crate::MemoryStorage`] in process.
//!
//! Deduplication and counting rely on the backend: `insert_vote_if_absent`
//! must be atomic against concurrent identical inserts and `increment_tally`
//! must never lose an update, across every service instance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinekami_common::AppResult;

use crate::entities::VoteCategory;
use crate::models::{
    CatalogMovie, Movie, MovieListItem, MovieScan, PopularityBounds, SnapshotListItem,
    SnapshotRecord, SnapshotScan, TallyKeyset, TallyMap, TallyRow, YearMonth,
};

/// Movie catalog access.
#[async_trait]
pub trait MovieStore: Send + Sync {
    /// One page of movies released in `month`, ordered by `scan`.
    async fn list_active_movies(
        &self,
        month: YearMonth,
        scan: &MovieScan,
    ) -> AppResult<Vec<MovieListItem>>;

    /// Number of movies released in `month` within `bounds`.
    async fn count_active_movies(&self, month: YearMonth, bounds: PopularityBounds)
    -> AppResult<u64>;

    /// Find a movie by id.
    async fn find_movie(&self, id: i64) -> AppResult<Option<Movie>>;

    /// Whether any movie exists.
    async fn has_movies(&self) -> AppResult<bool>;

    /// Insert a movie or refresh its catalog fields.
    async fn upsert_movie(&self, movie: &CatalogMovie) -> AppResult<()>;

    /// Ids of movies released in `month`, ascending.
    async fn movie_ids_released_in(&self, month: YearMonth) -> AppResult<Vec<i64>>;
}

/// Votes and tally counters.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Resolve a fingerprint to a voter id, creating the voter if needed.
    async fn get_or_create_voter(&self, fingerprint: &str) -> AppResult<i64>;

    /// Record a vote unless the voter already voted on the movie.
    ///
    /// Returns `false` for a duplicate.
    async fn insert_vote_if_absent(
        &self,
        movie_id: i64,
        voter_id: i64,
        category: VoteCategory,
    ) -> AppResult<bool>;

    /// Add one to a movie's category counter.
    async fn increment_tally(&self, movie_id: i64, category: VoteCategory) -> AppResult<()>;

    /// All four counters of a movie.
    async fn tallies(&self, movie_id: i64) -> AppResult<TallyMap>;

    /// Counters ordered by count descending then category name, after `after`.
    async fn list_tallies(
        &self,
        movie_id: i64,
        after: Option<&TallyKeyset>,
        limit: u64,
    ) -> AppResult<Vec<TallyRow>>;

    /// Category the fingerprint voted for on a movie, if any.
    async fn voter_category(
        &self,
        movie_id: i64,
        fingerprint: &str,
    ) -> AppResult<Option<VoteCategory>>;
}

/// Monthly snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Write or overwrite the snapshot of a movie for a month.
    async fn upsert_snapshot(
        &self,
        month: YearMonth,
        movie_id: i64,
        tallies: &TallyMap,
        closed_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Find a single snapshot.
    async fn find_snapshot(
        &self,
        month: YearMonth,
        movie_id: i64,
    ) -> AppResult<Option<SnapshotRecord>>;

    /// One page of a month's snapshots, ordered by `scan`.
    async fn list_snapshots(
        &self,
        month: YearMonth,
        scan: &SnapshotScan,
    ) -> AppResult<Vec<SnapshotListItem>>;

    /// Number of a month's snapshots within `bounds`.
    async fn count_snapshots(&self, month: YearMonth, bounds: PopularityBounds) -> AppResult<u64>;

    /// Months that have at least one snapshot, newest first.
    async fn available_months(&self) -> AppResult<Vec<YearMonth>>;
}

/// Every storage capability.
pub trait Storage: MovieStore + VoteStore + SnapshotStore {}

impl<T: MovieStore + VoteStore + SnapshotStore> Storage for T {}
