//! Keyset pagination over movies, tallies and snapshots.
//!
//! Every page is cached as the exact JSON body served to clients. A cache
//! hit returns the stored body verbatim; cache failures only cost a
//! recomputation and never fail the request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cinekami_common::cache::{LIVE_PAGE_TTL, SNAPSHOT_PAGE_TTL};
use cinekami_common::{AppError, AppResult, Cache, CacheKeys, Cursor, CursorCodec, CursorKind};
use cinekami_db::{
    Keyset, MovieScan, MovieStore, PopularityBounds, SnapshotScan, SnapshotStore, SortDir,
    SortField, Storage, TallyKeyset, VoteCategory, VoteStore, YearMonth,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Page size when none is requested.
pub const DEFAULT_LIMIT: u64 = 20;

/// Largest accepted page size.
pub const MAX_LIMIT: u64 = 100;

/// Raw pagination query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    pub min_popularity: Option<String>,
    pub max_popularity: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<String>,
}

/// Validated pagination request with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub sort: SortField,
    pub dir: SortDir,
    pub bounds: PopularityBounds,
    /// Opaque continuation token, decoded per resource.
    pub cursor: Option<String>,
    pub limit: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            sort: SortField::Popularity,
            dir: SortDir::Desc,
            bounds: PopularityBounds::default(),
            cursor: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_bound(name: &str, value: Option<&String>) -> AppResult<Option<f64>> {
    let Some(raw) = present(value) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(v) if !v.is_nan() => Ok(Some(v)),
        _ => Err(AppError::BadRequest(format!("invalid {name}"))),
    }
}

/// Parse a page size, applying the default and the `1..=100` range.
pub fn parse_limit(value: Option<&String>) -> AppResult<u64> {
    let Some(raw) = present(value) else {
        return Ok(DEFAULT_LIMIT);
    };
    match raw.parse::<u64>() {
        Ok(limit) if (1..=MAX_LIMIT).contains(&limit) => Ok(limit),
        _ => Err(AppError::BadRequest(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        ))),
    }
}

impl PageParams {
    /// Validate for the active-movie listing.
    pub fn for_movies(&self) -> AppResult<PageRequest> {
        self.normalize(false)
    }

    /// Validate for a snapshot listing, which also sorts by `movie_id`.
    pub fn for_snapshots(&self) -> AppResult<PageRequest> {
        self.normalize(true)
    }

    fn normalize(&self, allow_movie_id: bool) -> AppResult<PageRequest> {
        let sort = match present(self.sort_by.as_ref()).map(str::to_ascii_lowercase) {
            None => SortField::Popularity,
            Some(raw) => match raw.parse::<SortField>()? {
                SortField::MovieId if !allow_movie_id => {
                    return Err(AppError::BadRequest(format!("invalid sort_by: {raw}")));
                }
                sort => sort,
            },
        };
        let dir = present(self.sort_dir.as_ref())
            .map(|raw| raw.to_ascii_lowercase().parse::<SortDir>())
            .transpose()?
            .unwrap_or_default();

        let min = parse_bound("min_popularity", self.min_popularity.as_ref())?;
        let max = parse_bound("max_popularity", self.max_popularity.as_ref())?;
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(AppError::InvalidFilter(
                    "min_popularity > max_popularity".to_string(),
                ));
            }
        }
        let defaults = PopularityBounds::default();
        let bounds = PopularityBounds {
            min: min.unwrap_or(defaults.min),
            max: max.unwrap_or(defaults.max),
        };

        Ok(PageRequest {
            sort,
            dir,
            bounds,
            cursor: present(self.cursor.as_ref()).map(str::to_string),
            limit: parse_limit(self.limit.as_ref())?,
        })
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: usize,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T: Serialize> Page<T> {
    fn into_json(self) -> AppResult<String> {
        serde_json::to_string(&self)
            .map_err(|e| AppError::Internal(format!("Failed to serialize page: {e}")))
    }
}

/// One row of a movie's tally listing.
#[derive(Debug, Clone, Serialize)]
pub struct TallyItem {
    pub movie_id: i64,
    pub category: VoteCategory,
    pub count: i64,
    pub voter_choice: bool,
}

/// Month entry in the archive listing.
#[derive(Debug, Clone, Serialize)]
struct AvailableMonths {
    items: Vec<YearMonth>,
}

/// Paginated, cached read paths.
#[derive(Clone)]
pub struct PageQueryEngine {
    storage: Arc<dyn Storage>,
    cache: Arc<dyn Cache>,
    codec: CursorCodec,
}

impl PageQueryEngine {
    /// Create a new page query engine.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<dyn Cache>, codec: CursorCodec) -> Self {
        Self {
            storage,
            cache,
            codec,
        }
    }

    /// Serve `key` from the cache, or compute and store it.
    async fn cached<F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> AppResult<String>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AppResult<String>> + Send,
    {
        match self.cache.get(key).await {
            Ok(Some(body)) => {
                debug!(key = %key, "Page cache hit");
                return Ok(body);
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Page cache read failed"),
        }

        let body = compute().await?;
        if let Err(e) = self.cache.set(key, &body, ttl).await {
            warn!(key = %key, error = %e, "Page cache write failed");
        }
        Ok(body)
    }

    fn metric_cursor(&self, kind: CursorKind, token: Option<&str>) -> AppResult<Option<Keyset>> {
        let Some(token) = token else {
            return Ok(None);
        };
        match self.codec.decode(kind, token)? {
            Cursor::Metric { key, id } => Ok(Some(Keyset { key, id })),
            Cursor::Id(id) => Ok(Some(Keyset { key: id as f64, id })),
            Cursor::Tally { .. } => Err(AppError::InvalidCursor("invalid payload".to_string())),
        }
    }

    fn tally_cursor(&self, token: Option<&str>) -> AppResult<Option<TallyKeyset>> {
        let Some(token) = token else {
            return Ok(None);
        };
        match self.codec.decode(CursorKind::Tallies, token)? {
            Cursor::Tally { count, category } => {
                let category = category
                    .parse::<VoteCategory>()
                    .map_err(|_| AppError::InvalidCursor("invalid payload".to_string()))?;
                Ok(Some(TallyKeyset { count, category }))
            }
            _ => Err(AppError::InvalidCursor("invalid payload".to_string())),
        }
    }

    /// Movies released in the current UTC month.
    pub async fn active_movies(
        &self,
        now: DateTime<Utc>,
        req: &PageRequest,
        fingerprint: Option<&str>,
    ) -> AppResult<String> {
        let month = YearMonth::containing(now);
        let after = self.metric_cursor(CursorKind::Movies, req.cursor.as_deref())?;
        let fingerprint = fingerprint.filter(|fp| !fp.is_empty());

        let key = format!(
            "{}sort:{}:dir:{}:min:{}:max:{}:cursor:{}:limit:{}:fp:{}",
            CacheKeys::active_movies_prefix(&month.to_string()),
            req.sort.as_str(),
            req.dir.as_str(),
            req.bounds.min,
            req.bounds.max,
            req.cursor.as_deref().unwrap_or_default(),
            req.limit,
            fingerprint.unwrap_or_default(),
        );

        self.cached(&key, LIVE_PAGE_TTL, || async move {
            let scan = MovieScan {
                sort: req.sort,
                dir: req.dir,
                bounds: req.bounds,
                after,
                limit: req.limit,
                fingerprint: fingerprint.map(str::to_string),
            };
            let items = self.storage.list_active_movies(month, &scan).await?;
            let total = self.storage.count_active_movies(month, req.bounds).await?;

            let next_cursor = match items.last() {
                Some(last) if items.len() as u64 == req.limit => Some(self.codec.encode(
                    CursorKind::Movies,
                    &Cursor::Metric {
                        key: last.sort_key,
                        id: last.movie.id,
                    },
                )?),
                _ => None,
            };

            Page {
                count: items.len(),
                items,
                total,
                next_cursor,
            }
            .into_json()
        })
        .await
    }

    /// A movie's four counters, count descending then category name.
    pub async fn movie_tallies(
        &self,
        movie_id: i64,
        cursor: Option<&str>,
        limit: u64,
        fingerprint: Option<&str>,
    ) -> AppResult<String> {
        let cursor = cursor.map(str::trim).filter(|c| !c.is_empty());
        let after = self.tally_cursor(cursor)?;
        let fingerprint = fingerprint.filter(|fp| !fp.is_empty());

        let key = format!(
            "{}cursor:{}:limit:{}:fp:{}",
            CacheKeys::tallies_prefix(movie_id),
            cursor.unwrap_or_default(),
            limit,
            fingerprint.unwrap_or_default(),
        );

        self.cached(&key, LIVE_PAGE_TTL, || async move {
            if self.storage.find_movie(movie_id).await?.is_none() {
                return Err(AppError::MovieNotFound(movie_id));
            }
            let choice = match fingerprint {
                Some(fp) => self.storage.voter_category(movie_id, fp).await?,
                None => None,
            };
            let rows = self
                .storage
                .list_tallies(movie_id, after.as_ref(), limit)
                .await?;

            let next_cursor = match rows.last() {
                Some(last) if rows.len() as u64 == limit => Some(self.codec.encode(
                    CursorKind::Tallies,
                    &Cursor::Tally {
                        count: last.count,
                        category: last.category.as_str().to_string(),
                    },
                )?),
                _ => None,
            };

            let items: Vec<TallyItem> = rows
                .into_iter()
                .map(|row| TallyItem {
                    movie_id,
                    category: row.category,
                    count: row.count,
                    voter_choice: choice == Some(row.category),
                })
                .collect();

            Page {
                count: items.len(),
                items,
                total: VoteCategory::ALL.len() as u64,
                next_cursor,
            }
            .into_json()
        })
        .await
    }

    /// Archived snapshots of a month joined with movie metadata.
    pub async fn snapshots(&self, month: YearMonth, req: &PageRequest) -> AppResult<String> {
        let kind = if req.sort == SortField::MovieId {
            CursorKind::SnapshotsById
        } else {
            CursorKind::Snapshots
        };
        let after = self.metric_cursor(kind, req.cursor.as_deref())?;

        let key = format!(
            "{}sort:{}:dir:{}:min:{}:max:{}:cursor:{}:limit:{}",
            CacheKeys::snapshots_prefix(&month.to_string()),
            req.sort.as_str(),
            req.dir.as_str(),
            req.bounds.min,
            req.bounds.max,
            req.cursor.as_deref().unwrap_or_default(),
            req.limit,
        );

        self.cached(&key, SNAPSHOT_PAGE_TTL, || async move {
            let scan = SnapshotScan {
                sort: req.sort,
                dir: req.dir,
                bounds: req.bounds,
                after,
                limit: req.limit,
            };
            let items = self.storage.list_snapshots(month, &scan).await?;
            let total = self.storage.count_snapshots(month, req.bounds).await?;

            let next_cursor = match items.last() {
                Some(last) if items.len() as u64 == req.limit => {
                    let cursor = match kind {
                        CursorKind::SnapshotsById => Cursor::Id(last.snapshot.movie_id),
                        _ => Cursor::Metric {
                            key: last.sort_key,
                            id: last.snapshot.movie_id,
                        },
                    };
                    Some(self.codec.encode(kind, &cursor)?)
                }
                _ => None,
            };

            Page {
                count: items.len(),
                items,
                total,
                next_cursor,
            }
            .into_json()
        })
        .await
    }

    /// Months with archived snapshots, newest first.
    pub async fn available_snapshot_months(&self) -> AppResult<String> {
        self.cached(CacheKeys::snapshots_available(), SNAPSHOT_PAGE_TTL, || async move {
            let items = self.storage.available_months().await?;
            serde_json::to_string(&AvailableMonths { items })
                .map_err(|e| AppError::Internal(format!("Failed to serialize months: {e}")))
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use cinekami_common::InMemoryCache;
    use cinekami_db::test_utils::catalog_movie;
    use cinekami_db::{MemoryStorage, TallyMap};
    use serde_json::Value;

    /// A cache whose backend is unreachable.
    struct DownCache;

    #[async_trait::async_trait]
    impl Cache for DownCache {
        async fn get(&self, _key: &str) -> AppResult<Option<String>> {
            Err(AppError::StorageUnavailable("cache down".to_string()))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> AppResult<()> {
            Err(AppError::StorageUnavailable("cache down".to_string()))
        }

        async fn delete(&self, _key: &str) -> AppResult<()> {
            Err(AppError::StorageUnavailable("cache down".to_string()))
        }

        async fn delete_prefix(&self, _prefix: &str) -> AppResult<u64> {
            Err(AppError::StorageUnavailable("cache down".to_string()))
        }
    }

    fn params(pairs: &[(&str, &str)]) -> PageParams {
        let mut p = PageParams::default();
        for (k, v) in pairs {
            let v = Some((*v).to_string());
            match *k {
                "sort_by" => p.sort_by = v,
                "sort_dir" => p.sort_dir = v,
                "min_popularity" => p.min_popularity = v,
                "max_popularity" => p.max_popularity = v,
                "cursor" => p.cursor = v,
                "limit" => p.limit = v,
                _ => unreachable!(),
            }
        }
        p
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn march(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    fn engine(storage: &MemoryStorage, cache: &InMemoryCache) -> PageQueryEngine {
        PageQueryEngine::new(
            Arc::new(storage.clone()),
            Arc::new(cache.clone()),
            CursorCodec::new(b"page-test-secret"),
        )
    }

    fn ids(body: &str) -> (Vec<i64>, Option<String>) {
        let page: Value = serde_json::from_str(body).unwrap();
        let ids = page["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["id"].as_i64().or_else(|| i["movie_id"].as_i64()).unwrap())
            .collect();
        let next = page["next_cursor"].as_str().map(str::to_string);
        (ids, next)
    }

    #[test]
    fn test_defaults() {
        let req = PageParams::default().for_movies().unwrap();
        assert_eq!(req, PageRequest::default());
        assert_eq!(req.bounds.min, f64::NEG_INFINITY);
        assert_eq!(req.bounds.max, f64::INFINITY);
    }

    #[test]
    fn test_min_above_max_is_invalid_filter() {
        let err = params(&[("min_popularity", "10"), ("max_popularity", "5")])
            .for_movies()
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidFilter(_)));
    }

    #[test]
    fn test_rejects_bad_params() {
        for pairs in [
            [("limit", "0")],
            [("limit", "101")],
            [("limit", "ten")],
            [("sort_by", "title")],
            [("sort_dir", "up")],
            [("min_popularity", "abc")],
            [("sort_by", "movie_id")],
        ] {
            let err = params(&pairs).for_movies().unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{pairs:?}");
        }
        assert_eq!(
            params(&[("sort_by", "movie_id")]).for_snapshots().unwrap().sort,
            SortField::MovieId
        );
    }

    #[tokio::test]
    async fn test_full_scan_visits_tied_rows_once() {
        let storage = MemoryStorage::new();
        let cache = InMemoryCache::new();
        let pops = [5.0, 5.0, 9.0, 1.0, 5.0, 9.0, 3.0];
        for (i, pop) in pops.iter().enumerate() {
            let id = i as i64 + 1;
            storage.upsert_movie(&catalog_movie(id, march(1), *pop)).await.unwrap();
        }
        let engine = engine(&storage, &cache);

        for dir in ["desc", "asc"] {
            let mut seen = Vec::new();
            let mut cursor: Option<String> = None;
            loop {
                let mut p = params(&[("limit", "2"), ("sort_dir", dir)]);
                p.cursor = cursor.clone();
                let body = engine.active_movies(now(), &p.for_movies().unwrap(), None).await.unwrap();
                let (page_ids, next) = ids(&body);
                seen.extend(page_ids);
                match next {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
            let mut expected = vec![6, 3, 5, 2, 1, 7, 4];
            if dir == "asc" {
                expected.reverse();
            }
            assert_eq!(seen, expected, "{dir}");
        }
    }

    #[tokio::test]
    async fn test_page_shape_and_total() {
        let storage = MemoryStorage::new();
        let cache = InMemoryCache::new();
        for id in 1..=3 {
            storage.upsert_movie(&catalog_movie(id, march(2), id as f64)).await.unwrap();
        }
        let engine = engine(&storage, &cache);

        let req = params(&[("limit", "2"), ("min_popularity", "2")]).for_movies().unwrap();
        let body = engine.active_movies(now(), &req, None).await.unwrap();
        let page: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(page["count"], 2);
        assert_eq!(page["total"], 2);
        assert!(page["next_cursor"].is_string());
        assert_eq!(page["items"][0]["tallies"]["couple"], 0);
    }

    #[tokio::test]
    async fn test_cache_hit_returns_stored_body() {
        let storage = MemoryStorage::new();
        let cache = InMemoryCache::new();
        storage.upsert_movie(&catalog_movie(1, march(2), 1.0)).await.unwrap();
        let engine = engine(&storage, &cache);
        let req = PageRequest::default();

        let first = engine.active_movies(now(), &req, None).await.unwrap();
        storage.upsert_movie(&catalog_movie(2, march(2), 2.0)).await.unwrap();
        let second = engine.active_movies(now(), &req, None).await.unwrap();
        assert_eq!(first, second);

        cache
            .delete_prefix(&CacheKeys::active_movies_prefix("2025-03"))
            .await
            .unwrap();
        let third = engine.active_movies(now(), &req, None).await.unwrap();
        assert_eq!(ids(&third).0, [2, 1]);
    }

    #[tokio::test]
    async fn test_tampered_cursor_is_client_error() {
        let storage = MemoryStorage::new();
        let cache = InMemoryCache::new();
        let engine = engine(&storage, &cache);

        let req = params(&[("cursor", "AAAAAAAAAAAAAAAAAAAAAA")]).for_movies().unwrap();
        let err = engine.active_movies(now(), &req, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCursor(_)));
    }

    #[tokio::test]
    async fn test_movie_cursor_rejected_for_snapshots() {
        let storage = MemoryStorage::new();
        let cache = InMemoryCache::new();
        for id in 1..=3 {
            storage.upsert_movie(&catalog_movie(id, march(2), 1.0)).await.unwrap();
        }
        let engine = engine(&storage, &cache);
        let body = engine
            .active_movies(now(), &params(&[("limit", "1")]).for_movies().unwrap(), None)
            .await
            .unwrap();
        let (_, next) = ids(&body);

        let mut p = params(&[("limit", "1")]);
        p.cursor = next;
        let month = YearMonth::new(2025, 3).unwrap();
        let err = engine.snapshots(month, &p.for_snapshots().unwrap()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCursor(_)));
    }

    #[tokio::test]
    async fn test_tallies_ranked_with_voter_choice() {
        let storage = MemoryStorage::new();
        let cache = InMemoryCache::new();
        storage.upsert_movie(&catalog_movie(42, march(1), 1.0)).await.unwrap();
        let voter = storage.get_or_create_voter("fp-A").await.unwrap();
        storage.insert_vote_if_absent(42, voter, VoteCategory::Streaming).await.unwrap();
        storage.increment_tally(42, VoteCategory::Streaming).await.unwrap();
        let engine = engine(&storage, &cache);

        let first = engine.movie_tallies(42, None, 3, Some("fp-A")).await.unwrap();
        let page: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(page["total"], 4);
        assert_eq!(page["items"][0]["category"], "streaming");
        assert_eq!(page["items"][0]["voter_choice"], true);
        assert_eq!(page["items"][1]["category"], "arr");
        assert_eq!(page["items"][1]["voter_choice"], false);

        let next = page["next_cursor"].as_str().unwrap();
        let rest = engine.movie_tallies(42, Some(next), 3, None).await.unwrap();
        let rest: Value = serde_json::from_str(&rest).unwrap();
        assert_eq!(rest["count"], 1);
        assert_eq!(rest["items"][0]["category"], "solo_friends");
        assert!(rest.get("next_cursor").is_none());
    }

    #[tokio::test]
    async fn test_tallies_unknown_movie() {
        let storage = MemoryStorage::new();
        let cache = InMemoryCache::new();
        let err = engine(&storage, &cache)
            .movie_tallies(7, None, 20, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MovieNotFound(7)));
    }

    #[tokio::test]
    async fn test_snapshots_by_movie_id() {
        let storage = MemoryStorage::new();
        let cache = InMemoryCache::new();
        let month = YearMonth::new(2025, 3).unwrap();
        for id in [30, 10, 20] {
            storage.upsert_movie(&catalog_movie(id, march(3), 1.0)).await.unwrap();
            storage
                .upsert_snapshot(month, id, &TallyMap::zero(), now())
                .await
                .unwrap();
        }
        let engine = engine(&storage, &cache);

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let mut p = params(&[("sort_by", "movie_id"), ("sort_dir", "asc"), ("limit", "2")]);
            p.cursor = cursor;
            let body = engine.snapshots(month, &p.for_snapshots().unwrap()).await.unwrap();
            let (page_ids, next) = ids(&body);
            seen.extend(page_ids);
            cursor = next;
            if cursor.is_none() {
                break;
            }
        }
        assert_eq!(seen, [10, 20, 30]);

        let months: Value =
            serde_json::from_str(&engine.available_snapshot_months().await.unwrap()).unwrap();
        assert_eq!(months["items"][0], serde_json::json!({"year": 2025, "month": 3}));
    }

    #[tokio::test]
    async fn test_cache_outage_serves_from_storage() {
        let storage = MemoryStorage::new();
        let month = YearMonth::new(2025, 3).unwrap();
        for id in 1..=3 {
            storage.upsert_movie(&catalog_movie(id, march(4), id as f64)).await.unwrap();
        }
        storage.increment_tally(2, VoteCategory::Couple).await.unwrap();
        storage
            .upsert_snapshot(month, 2, &storage.tallies(2).await.unwrap(), now())
            .await
            .unwrap();
        let engine = PageQueryEngine::new(
            Arc::new(storage.clone()),
            Arc::new(DownCache),
            CursorCodec::new(b"page-test-secret"),
        );

        let req = params(&[("limit", "2")]).for_movies().unwrap();
        let (first, next) = ids(&engine.active_movies(now(), &req, Some("fp-A")).await.unwrap());
        assert_eq!(first, [3, 2]);
        let mut rest = params(&[("limit", "2")]);
        rest.cursor = next;
        let rest = engine
            .active_movies(now(), &rest.for_movies().unwrap(), Some("fp-A"))
            .await
            .unwrap();
        assert_eq!(ids(&rest).0, [1]);

        // Nothing was cached, so new data shows up immediately.
        storage.increment_tally(2, VoteCategory::Couple).await.unwrap();
        let tallies: Value =
            serde_json::from_str(&engine.movie_tallies(2, None, 20, None).await.unwrap()).unwrap();
        assert_eq!(tallies["items"][0]["category"], "couple");
        assert_eq!(tallies["items"][0]["count"], 2);
        assert_eq!(tallies["total"], 4);

        let snapshots = engine.snapshots(month, &PageRequest::default()).await.unwrap();
        let snapshots: Value = serde_json::from_str(&snapshots).unwrap();
        assert_eq!(snapshots["count"], 1);
        assert_eq!(snapshots["items"][0]["movie_id"], 2);
        assert_eq!(snapshots["items"][0]["tallies"]["couple"], 1);

        let months: Value =
            serde_json::from_str(&engine.available_snapshot_months().await.unwrap()).unwrap();
        assert_eq!(months["items"][0], serde_json::json!({"year": 2025, "month": 3}));
    }
}
