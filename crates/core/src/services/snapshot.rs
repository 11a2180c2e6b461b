//! Monthly snapshot archival.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use cinekami_common::AppResult;
use cinekami_db::{MovieStore, SnapshotStore, Storage, VoteStore, YearMonth};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::invalidation::CacheInvalidator;

/// Outcome of one archive run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveReport {
    pub month: YearMonth,
    pub archived: usize,
    pub failed: usize,
    /// The run stopped early on cancellation.
    pub cancelled: bool,
}

/// First archival trigger after `now`: 00:05 UTC on the 1st of next month.
#[must_use]
pub fn next_monthly_run(now: DateTime<Utc>) -> DateTime<Utc> {
    let run_at = NaiveTime::from_hms_opt(0, 5, 0).unwrap_or(NaiveTime::MIN);
    YearMonth::containing(now)
        .next()
        .first_day()
        .and_time(run_at)
        .and_utc()
}

/// Freezes a month's tallies into snapshot rows.
#[derive(Clone)]
pub struct SnapshotArchiver {
    storage: Arc<dyn Storage>,
    invalidator: CacheInvalidator,
}

impl SnapshotArchiver {
    /// Create a new archiver.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, invalidator: CacheInvalidator) -> Self {
        Self {
            storage,
            invalidator,
        }
    }

    /// Snapshot every movie released in `month`.
    ///
    /// Existing snapshots are overwritten. A failure on one movie is logged
    /// and counted; the remaining movies are still archived. Cancellation
    /// is only observed between movies.
    pub async fn archive_month(
        &self,
        month: YearMonth,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> AppResult<ArchiveReport> {
        let movie_ids = self.storage.movie_ids_released_in(month).await?;
        info!(%month, movies = movie_ids.len(), "Archiving month");

        let mut report = ArchiveReport {
            month,
            archived: 0,
            failed: 0,
            cancelled: false,
        };

        for movie_id in movie_ids {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.archive_movie(month, movie_id, now).await {
                Ok(()) => report.archived += 1,
                Err(e) => {
                    warn!(%month, movie_id, error = %e, "Failed to archive movie");
                    report.failed += 1;
                }
            }
        }

        self.invalidator.invalidate_snapshots(month).await;
        info!(
            %month,
            archived = report.archived,
            failed = report.failed,
            cancelled = report.cancelled,
            "Archive run finished"
        );
        Ok(report)
    }

    async fn archive_movie(
        &self,
        month: YearMonth,
        movie_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let tallies = self.storage.tallies(movie_id).await?;
        self.storage
            .upsert_snapshot(month, movie_id, &tallies, now)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use cinekami_common::{AppError, InMemoryCache};
    use cinekami_db::test_utils::catalog_movie;
    use cinekami_db::{
        CatalogMovie, MemoryStorage, Movie, MovieListItem, MovieScan, PopularityBounds,
        SnapshotListItem, SnapshotRecord, SnapshotScan, TallyKeyset, TallyMap, TallyRow,
        VoteCategory,
    };

    use crate::services::vote::VoteLedger;

    fn march() -> YearMonth {
        YearMonth::new(2025, 3).unwrap()
    }

    fn archiver(storage: &MemoryStorage) -> SnapshotArchiver {
        SnapshotArchiver::new(
            Arc::new(storage.clone()),
            CacheInvalidator::new(Arc::new(InMemoryCache::new())),
        )
    }

    /// Memory storage whose tally reads fail for one movie.
    struct TallyOutage {
        inner: MemoryStorage,
        broken_movie: i64,
    }

    #[async_trait]
    impl MovieStore for TallyOutage {
        async fn list_active_movies(
            &self,
            month: YearMonth,
            scan: &MovieScan,
        ) -> AppResult<Vec<MovieListItem>> {
            self.inner.list_active_movies(month, scan).await
        }

        async fn count_active_movies(
            &self,
            month: YearMonth,
            bounds: PopularityBounds,
        ) -> AppResult<u64> {
            self.inner.count_active_movies(month, bounds).await
        }

        async fn find_movie(&self, id: i64) -> AppResult<Option<Movie>> {
            self.inner.find_movie(id).await
        }

        async fn has_movies(&self) -> AppResult<bool> {
            self.inner.has_movies().await
        }

        async fn upsert_movie(&self, movie: &CatalogMovie) -> AppResult<()> {
            self.inner.upsert_movie(movie).await
        }

        async fn movie_ids_released_in(&self, month: YearMonth) -> AppResult<Vec<i64>> {
            self.inner.movie_ids_released_in(month).await
        }
    }

    #[async_trait]
    impl VoteStore for TallyOutage {
        async fn get_or_create_voter(&self, fingerprint: &str) -> AppResult<i64> {
            self.inner.get_or_create_voter(fingerprint).await
        }

        async fn insert_vote_if_absent(
            &self,
            movie_id: i64,
            voter_id: i64,
            category: VoteCategory,
        ) -> AppResult<bool> {
            self.inner
                .insert_vote_if_absent(movie_id, voter_id, category)
                .await
        }

        async fn increment_tally(&self, movie_id: i64, category: VoteCategory) -> AppResult<()> {
            self.inner.increment_tally(movie_id, category).await
        }

        async fn tallies(&self, movie_id: i64) -> AppResult<TallyMap> {
            if movie_id == self.broken_movie {
                return Err(AppError::StorageUnavailable("connection reset".to_string()));
            }
            self.inner.tallies(movie_id).await
        }

        async fn list_tallies(
            &self,
            movie_id: i64,
            after: Option<&TallyKeyset>,
            limit: u64,
        ) -> AppResult<Vec<TallyRow>> {
            self.inner.list_tallies(movie_id, after, limit).await
        }

        async fn voter_category(
            &self,
            movie_id: i64,
            fingerprint: &str,
        ) -> AppResult<Option<VoteCategory>> {
            self.inner.voter_category(movie_id, fingerprint).await
        }
    }

    #[async_trait]
    impl SnapshotStore for TallyOutage {
        async fn upsert_snapshot(
            &self,
            month: YearMonth,
            movie_id: i64,
            tallies: &TallyMap,
            closed_at: DateTime<Utc>,
        ) -> AppResult<()> {
            self.inner
                .upsert_snapshot(month, movie_id, tallies, closed_at)
                .await
        }

        async fn find_snapshot(
            &self,
            month: YearMonth,
            movie_id: i64,
        ) -> AppResult<Option<SnapshotRecord>> {
            self.inner.find_snapshot(month, movie_id).await
        }

        async fn list_snapshots(
            &self,
            month: YearMonth,
            scan: &SnapshotScan,
        ) -> AppResult<Vec<SnapshotListItem>> {
            self.inner.list_snapshots(month, scan).await
        }

        async fn count_snapshots(
            &self,
            month: YearMonth,
            bounds: PopularityBounds,
        ) -> AppResult<u64> {
            self.inner.count_snapshots(month, bounds).await
        }

        async fn available_months(&self) -> AppResult<Vec<YearMonth>> {
            self.inner.available_months().await
        }
    }

    #[test]
    fn test_next_monthly_run() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            next_monthly_run(now),
            Utc.with_ymd_and_hms(2025, 4, 1, 0, 5, 0).unwrap()
        );
        let december = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            next_monthly_run(december),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_vote_and_archive_scenario() {
        let storage = MemoryStorage::new();
        let release = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        storage.upsert_movie(&catalog_movie(42, release, 10.0)).await.unwrap();
        let ledger = VoteLedger::new(Arc::new(storage.clone()));
        let voted_at = Utc.with_ymd_and_hms(2025, 3, 2, 10, 0, 0).unwrap();

        let first = ledger.cast_vote(42, "couple", "fp-A", voted_at).await.unwrap();
        assert!(first.inserted);
        assert_eq!(first.tallies.get(VoteCategory::Couple), 1);
        assert_eq!(first.tallies.total(), 1);

        let again = ledger.cast_vote(42, "couple", "fp-A", voted_at).await.unwrap();
        assert!(!again.inserted);
        assert_eq!(again.tallies, first.tallies);

        let other = ledger.cast_vote(42, "solo_friends", "fp-B", voted_at).await.unwrap();
        assert!(other.inserted);

        let closed_at = Utc.with_ymd_and_hms(2025, 4, 1, 0, 5, 0).unwrap();
        let report = archiver(&storage)
            .archive_month(march(), closed_at, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.archived, 1);
        assert_eq!(report.failed, 0);

        let snapshot = storage.find_snapshot(march(), 42).await.unwrap().unwrap();
        assert_eq!(snapshot.month, "2025-03");
        assert_eq!(snapshot.closed_at, closed_at);
        assert_eq!(
            serde_json::to_value(snapshot.tallies).unwrap(),
            serde_json::json!({"arr": 0, "couple": 1, "solo_friends": 1, "streaming": 0})
        );
    }

    #[tokio::test]
    async fn test_rerun_is_byte_identical() {
        let storage = MemoryStorage::new();
        for (id, day) in [(1, 1), (2, 31)] {
            let date = NaiveDate::from_ymd_opt(2025, 3, day).unwrap();
            storage.upsert_movie(&catalog_movie(id, date, 1.0)).await.unwrap();
        }
        storage
            .upsert_movie(&catalog_movie(3, NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(), 1.0))
            .await
            .unwrap();
        storage.increment_tally(1, VoteCategory::Arr).await.unwrap();

        let archiver = archiver(&storage);
        let now = Utc.with_ymd_and_hms(2025, 4, 1, 0, 5, 0).unwrap();
        let token = CancellationToken::new();

        archiver.archive_month(march(), now, &token).await.unwrap();
        let first = serde_json::to_string(&storage.find_snapshot(march(), 1).await.unwrap()).unwrap();
        let report = archiver.archive_month(march(), now, &token).await.unwrap();
        let second = serde_json::to_string(&storage.find_snapshot(march(), 1).await.unwrap()).unwrap();

        assert_eq!(report.archived, 2);
        assert_eq!(first, second);
        assert!(storage.find_snapshot(march(), 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() {
        let storage = MemoryStorage::new();
        storage
            .upsert_movie(&catalog_movie(1, NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(), 1.0))
            .await
            .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let report = archiver(&storage)
            .archive_month(march(), Utc::now(), &token)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.archived, 0);
        assert!(storage.available_months().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_movie_does_not_abort_batch() {
        let storage = MemoryStorage::new();
        for (id, day) in [(1, 3), (2, 10), (3, 20)] {
            let date = NaiveDate::from_ymd_opt(2025, 3, day).unwrap();
            storage.upsert_movie(&catalog_movie(id, date, 1.0)).await.unwrap();
        }
        storage.increment_tally(3, VoteCategory::Streaming).await.unwrap();

        let archiver = SnapshotArchiver::new(
            Arc::new(TallyOutage {
                inner: storage.clone(),
                broken_movie: 2,
            }),
            CacheInvalidator::new(Arc::new(InMemoryCache::new())),
        );
        let now = Utc.with_ymd_and_hms(2025, 4, 1, 0, 5, 0).unwrap();
        let report = archiver
            .archive_month(march(), now, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report,
            ArchiveReport {
                month: march(),
                archived: 2,
                failed: 1,
                cancelled: false,
            }
        );
        assert!(storage.find_snapshot(march(), 1).await.unwrap().is_some());
        assert!(storage.find_snapshot(march(), 2).await.unwrap().is_none());
        let later = storage.find_snapshot(march(), 3).await.unwrap().unwrap();
        assert_eq!(later.tallies.get(VoteCategory::Streaming), 1);
    }
}
