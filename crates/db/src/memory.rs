//! In-process storage backend.
//!
//! Mirrors [`crate::PgStorage`] semantics behind a single `RwLock`: vote
//! deduplication and tally increments happen under the write lock, so they
//! are atomic with respect to every other caller of the same instance.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinekami_common::AppResult;
use tokio::sync::RwLock;

use crate::entities::VoteCategory;
use crate::models::{
    CatalogMovie, Keyset, Movie, MovieListItem, MovieScan, PopularityBounds, SnapshotListItem,
    SnapshotRecord, SnapshotScan, SortDir, SortField, TallyKeyset, TallyMap, TallyRow, YearMonth,
};
use crate::store::{MovieStore, SnapshotStore, VoteStore};

#[derive(Debug, Default)]
struct State {
    movies: BTreeMap<i64, Movie>,
    voters: HashMap<String, i64>,
    /// (movie_id, voter_id) -> category
    votes: HashMap<(i64, i64), VoteCategory>,
    tallies: HashMap<i64, TallyMap>,
    /// (month, movie_id) -> snapshot
    snapshots: BTreeMap<(YearMonth, i64), SnapshotRecord>,
}

impl State {
    fn tallies_of(&self, movie_id: i64) -> TallyMap {
        self.tallies.get(&movie_id).copied().unwrap_or_default()
    }

    fn category_of(&self, movie_id: i64, fingerprint: &str) -> Option<VoteCategory> {
        let voter_id = self.voters.get(fingerprint)?;
        self.votes.get(&(movie_id, *voter_id)).copied()
    }
}

/// Storage held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<State>>,
}

impl MemoryStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded votes.
    pub async fn vote_count(&self) -> usize {
        self.state.read().await.votes.len()
    }
}

fn take(limit: u64) -> usize {
    usize::try_from(limit).unwrap_or(usize::MAX)
}

#[async_trait]
impl MovieStore for MemoryStorage {
    async fn list_active_movies(
        &self,
        month: YearMonth,
        scan: &MovieScan,
    ) -> AppResult<Vec<MovieListItem>> {
        let state = self.state.read().await;
        let mut items: Vec<MovieListItem> = state
            .movies
            .values()
            .filter(|m| month.contains(m.release_date) && scan.bounds.contains(m.popularity))
            .map(|m| {
                let tallies = state.tallies_of(m.id);
                MovieListItem {
                    sort_key: scan.sort.key_of(m.id, m.popularity, m.release_date, &tallies),
                    voted_category: scan
                        .fingerprint
                        .as_deref()
                        .and_then(|fp| state.category_of(m.id, fp)),
                    movie: m.clone(),
                    tallies,
                }
            })
            .filter(|item| {
                scan.after
                    .as_ref()
                    .is_none_or(|after| scan.dir.is_after(item.sort_key, item.movie.id, after))
            })
            .collect();

        let ascending = scan.dir == SortDir::Asc;
        items.sort_by(|a, b| {
            let ord = a
                .sort_key
                .total_cmp(&b.sort_key)
                .then_with(|| a.movie.id.cmp(&b.movie.id));
            if ascending { ord } else { ord.reverse() }
        });
        items.truncate(take(scan.limit));
        Ok(items)
    }

    async fn count_active_movies(
        &self,
        month: YearMonth,
        bounds: PopularityBounds,
    ) -> AppResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .movies
            .values()
            .filter(|m| month.contains(m.release_date) && bounds.contains(m.popularity))
            .count() as u64)
    }

    async fn find_movie(&self, id: i64) -> AppResult<Option<Movie>> {
        Ok(self.state.read().await.movies.get(&id).cloned())
    }

    async fn has_movies(&self) -> AppResult<bool> {
        Ok(!self.state.read().await.movies.is_empty())
    }

    async fn upsert_movie(&self, movie: &CatalogMovie) -> AppResult<()> {
        self.state
            .write()
            .await
            .movies
            .insert(movie.id, Movie::from(movie.clone()));
        Ok(())
    }

    async fn movie_ids_released_in(&self, month: YearMonth) -> AppResult<Vec<i64>> {
        let state = self.state.read().await;
        Ok(state
            .movies
            .values()
            .filter(|m| month.contains(m.release_date))
            .map(|m| m.id)
            .collect())
    }
}

#[async_trait]
impl VoteStore for MemoryStorage {
    async fn get_or_create_voter(&self, fingerprint: &str) -> AppResult<i64> {
        let mut state = self.state.write().await;
        let next_id = state.voters.len() as i64 + 1;
        Ok(*state
            .voters
            .entry(fingerprint.to_string())
            .or_insert(next_id))
    }

    async fn insert_vote_if_absent(
        &self,
        movie_id: i64,
        voter_id: i64,
        category: VoteCategory,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if state.votes.contains_key(&(movie_id, voter_id)) {
            return Ok(false);
        }
        state.votes.insert((movie_id, voter_id), category);
        Ok(true)
    }

    async fn increment_tally(&self, movie_id: i64, category: VoteCategory) -> AppResult<()> {
        self.state
            .write()
            .await
            .tallies
            .entry(movie_id)
            .or_default()
            .increment(category);
        Ok(())
    }

    async fn tallies(&self, movie_id: i64) -> AppResult<TallyMap> {
        Ok(self.state.read().await.tallies_of(movie_id))
    }

    async fn list_tallies(
        &self,
        movie_id: i64,
        after: Option<&TallyKeyset>,
        limit: u64,
    ) -> AppResult<Vec<TallyRow>> {
        Ok(self.state.read().await.tallies_of(movie_id).page(after, limit))
    }

    async fn voter_category(
        &self,
        movie_id: i64,
        fingerprint: &str,
    ) -> AppResult<Option<VoteCategory>> {
        Ok(self.state.read().await.category_of(movie_id, fingerprint))
    }
}

#[async_trait]
impl SnapshotStore for MemoryStorage {
    async fn upsert_snapshot(
        &self,
        month: YearMonth,
        movie_id: i64,
        tallies: &TallyMap,
        closed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.state.write().await.snapshots.insert(
            (month, movie_id),
            SnapshotRecord {
                month: month.to_string(),
                movie_id,
                tallies: *tallies,
                closed_at,
            },
        );
        Ok(())
    }

    async fn find_snapshot(
        &self,
        month: YearMonth,
        movie_id: i64,
    ) -> AppResult<Option<SnapshotRecord>> {
        Ok(self
            .state
            .read()
            .await
            .snapshots
            .get(&(month, movie_id))
            .cloned())
    }

    async fn list_snapshots(
        &self,
        month: YearMonth,
        scan: &SnapshotScan,
    ) -> AppResult<Vec<SnapshotListItem>> {
        let state = self.state.read().await;
        let mut items: Vec<SnapshotListItem> = state
            .snapshots
            .iter()
            .filter(|((m, _), _)| *m == month)
            .filter_map(|((_, movie_id), snapshot)| {
                let movie = state.movies.get(movie_id)?;
                if !scan.bounds.contains(movie.popularity) {
                    return None;
                }
                Some(SnapshotListItem {
                    sort_key: scan.sort.key_of(
                        movie.id,
                        movie.popularity,
                        movie.release_date,
                        &snapshot.tallies,
                    ),
                    snapshot: snapshot.clone(),
                    title: movie.title.clone(),
                    release_date: movie.release_date,
                    overview: movie.overview.clone(),
                    poster_path: movie.poster_path.clone(),
                    backdrop_path: movie.backdrop_path.clone(),
                    popularity: movie.popularity,
                })
            })
            .filter(|item| {
                scan.after.as_ref().is_none_or(|after| {
                    let id = item.snapshot.movie_id;
                    if scan.sort == SortField::MovieId {
                        let at = Keyset {
                            key: after.id as f64,
                            id: after.id,
                        };
                        scan.dir.is_after(id as f64, id, &at)
                    } else {
                        scan.dir.is_after(item.sort_key, id, after)
                    }
                })
            })
            .collect();

        let ascending = scan.dir == SortDir::Asc;
        items.sort_by(|a, b| {
            let ord = a
                .sort_key
                .total_cmp(&b.sort_key)
                .then_with(|| a.snapshot.movie_id.cmp(&b.snapshot.movie_id));
            if ascending { ord } else { ord.reverse() }
        });
        items.truncate(take(scan.limit));
        Ok(items)
    }

    async fn count_snapshots(&self, month: YearMonth, bounds: PopularityBounds) -> AppResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .snapshots
            .keys()
            .filter(|(m, movie_id)| {
                *m == month
                    && state
                        .movies
                        .get(movie_id)
                        .is_some_and(|movie| bounds.contains(movie.popularity))
            })
            .count() as u64)
    }

    async fn available_months(&self) -> AppResult<Vec<YearMonth>> {
        let state = self.state.read().await;
        let mut months: Vec<YearMonth> = state.snapshots.keys().map(|(m, _)| *m).collect();
        months.dedup();
        months.reverse();
        Ok(months)
    }
}
