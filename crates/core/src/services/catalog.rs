//! Catalog synchronisation from the external movie database.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use cinekami_common::config::CatalogConfig;
use cinekami_common::{AppResult, TmdbClient, TmdbExternalIds, TmdbMovie};
use cinekami_db::{CatalogMovie, MovieStore, Storage, YearMonth};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::invalidation::CacheInvalidator;

/// External source of movie metadata.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Movies released in `[start, end]`, most popular first.
    async fn movies_released_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        region: &str,
        language: &str,
    ) -> AppResult<Vec<TmdbMovie>>;

    /// Cross-reference ids of a movie.
    async fn external_ids(&self, movie_id: i64) -> AppResult<TmdbExternalIds>;
}

#[async_trait]
impl CatalogSource for TmdbClient {
    async fn movies_released_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        region: &str,
        language: &str,
    ) -> AppResult<Vec<TmdbMovie>> {
        self.discover_released_between(start, end, region, language)
            .await
    }

    async fn external_ids(&self, movie_id: i64) -> AppResult<TmdbExternalIds> {
        Self::external_ids(self, movie_id).await
    }
}

/// IMDb title page.
#[must_use]
pub fn imdb_url(imdb_id: &str) -> String {
    format!("https://www.imdb.com/title/{imdb_id}")
}

/// Cinemagia search page for a title. The query is form-encoded, so spaces become `+`.
#[must_use]
pub fn cinemagia_url(title: &str) -> String {
    let query: String = url::form_urlencoded::byte_serialize(title.as_bytes()).collect();
    format!("https://www.cinemagia.ro/cauta/?q={query}")
}

/// Pulls a month's releases into storage.
#[derive(Clone)]
pub struct CatalogSyncService {
    source: Arc<dyn CatalogSource>,
    storage: Arc<dyn Storage>,
    invalidator: CacheInvalidator,
    region: String,
    language: String,
    concurrency: usize,
}

impl CatalogSyncService {
    /// Create a new catalog sync service.
    #[must_use]
    pub fn new(
        source: Arc<dyn CatalogSource>,
        storage: Arc<dyn Storage>,
        invalidator: CacheInvalidator,
        config: &CatalogConfig,
    ) -> Self {
        Self {
            source,
            storage,
            invalidator,
            region: config.region.clone(),
            language: config.language.clone(),
            concurrency: config.enrich_concurrency.max(1),
        }
    }

    async fn enrich(&self, movie: TmdbMovie) -> CatalogMovie {
        let imdb_id = match self.source.external_ids(movie.id).await {
            Ok(ids) => ids.imdb_id.filter(|id| !id.is_empty()),
            Err(e) => {
                warn!(movie_id = movie.id, error = %e, "External id lookup failed");
                None
            }
        };

        CatalogMovie {
            imdb_url: imdb_id.as_deref().map(imdb_url),
            cinemagia_url: imdb_id.as_ref().map(|_| cinemagia_url(&movie.title)),
            id: movie.id,
            title: movie.title,
            release_date: movie.release_date,
            overview: movie.overview,
            poster_path: movie.poster_path,
            backdrop_path: movie.backdrop_path,
            popularity: movie.popularity,
        }
    }

    /// Fetch, enrich and upsert every release of `month`.
    ///
    /// Returns the number of movies written. The first storage error aborts
    /// the run; external-id failures only leave the links empty.
    pub async fn sync_month(
        &self,
        month: YearMonth,
        cancel: &CancellationToken,
    ) -> AppResult<usize> {
        let movies = self
            .source
            .movies_released_between(
                month.first_day(),
                month.last_day(),
                &self.region,
                &self.language,
            )
            .await?;
        info!(%month, fetched = movies.len(), "Catalog fetched");

        let enriched: Vec<CatalogMovie> = futures::stream::iter(movies)
            .map(|movie| self.enrich(movie))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut written = 0;
        for movie in &enriched {
            if cancel.is_cancelled() {
                debug!(%month, written, "Catalog sync cancelled");
                break;
            }
            self.storage.upsert_movie(movie).await?;
            written += 1;
        }

        self.invalidator.invalidate_active_movies(month).await;
        info!(%month, written, "Catalog sync finished");
        Ok(written)
    }

    /// Sync the current month only when storage holds no movie at all.
    pub async fn seed_if_empty(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> AppResult<Option<usize>> {
        if self.storage.has_movies().await? {
            debug!("Catalog already seeded");
            return Ok(None);
        }
        self.sync_month(YearMonth::containing(now), cancel)
            .await
            .map(Some)
    }
}
