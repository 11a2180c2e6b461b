//! TMDb catalog client.
//!
//! Fetches the movies released in a date window and their external ids.
//! Only the catalog sync job talks to TMDb; request handlers never do.

use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::CatalogConfig;
use crate::{AppError, AppResult};

/// Upper bound on discovery pages fetched in one sync.
const MAX_DISCOVER_PAGES: u32 = 500;

/// A movie as discovered in the external catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct TmdbMovie {
    /// TMDb id, used as the local movie id.
    pub id: i64,
    /// Title in the requested language.
    pub title: String,
    /// Primary release date.
    pub release_date: NaiveDate,
    /// Synopsis.
    pub overview: Option<String>,
    /// Poster image path.
    pub poster_path: Option<String>,
    /// Backdrop image path.
    pub backdrop_path: Option<String>,
    /// TMDb popularity score.
    pub popularity: f64,
}

/// External ids of a movie.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbExternalIds {
    /// IMDb title id (e.g. `tt0111161`).
    #[serde(default)]
    pub imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoverResponse {
    page: u32,
    total_pages: u32,
    #[serde(default)]
    results: Vec<DiscoverItem>,
}

#[derive(Debug, Deserialize)]
struct DiscoverItem {
    id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    release_date: String,
    #[serde(default)]
    overview: String,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    backdrop_path: Option<String>,
    #[serde(default)]
    popularity: f64,
    #[serde(default)]
    original_language: String,
    #[serde(default)]
    adult: bool,
}

/// TMDb HTTP client.
#[derive(Debug, Clone)]
pub struct TmdbClient {
    http: Client,
    api_key: String,
    base_url: String,
    min_popularity: f64,
    excluded_languages: HashSet<String>,
}

impl TmdbClient {
    /// Build a client from catalog configuration.
    ///
    /// Returns `Ok(None)` when no API key is configured.
    pub fn from_config(config: &CatalogConfig) -> AppResult<Option<Self>> {
        let Some(api_key) = config.api_key.as_ref().filter(|k| !k.is_empty()) else {
            return Ok(None);
        };

        let http = Client::builder()
            .user_agent("cinekami/1.0")
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build TMDb client: {e}")))?;

        Ok(Some(Self {
            http,
            api_key: api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            min_popularity: config.min_popularity,
            excluded_languages: config.excluded_languages.iter().cloned().collect(),
        }))
    }

    fn url(&self, path: &str) -> AppResult<Url> {
        let mut url = Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| AppError::Config(format!("Invalid TMDb base URL: {e}")))?;
        url.query_pairs_mut().append_pair("api_key", &self.api_key);
        Ok(url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> AppResult<T> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("TMDb request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "TMDb returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("Invalid TMDb response: {e}")))
    }

    /// Fetch theatrical releases with a primary release date in `[start, end]`.
    ///
    /// Results arrive most popular first; paging stops at the first movie
    /// below the configured popularity floor.
    pub async fn discover_released_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        region: &str,
        language: &str,
    ) -> AppResult<Vec<TmdbMovie>> {
        let mut out = Vec::new();
        let mut page = 1;

        loop {
            let mut url = self.url("/discover/movie")?;
            {
                let mut query = url.query_pairs_mut();
                if !region.is_empty() {
                    query.append_pair("region", region);
                }
                if !language.is_empty() {
                    query.append_pair("language", language);
                }
                query
                    .append_pair("with_release_type", "3|2|1")
                    .append_pair("primary_release_date.gte", &start.to_string())
                    .append_pair("primary_release_date.lte", &end.to_string())
                    .append_pair("sort_by", "popularity.desc")
                    .append_pair("page", &page.to_string());
            }

            let response: DiscoverResponse = self.get_json(url).await?;
            let reached_floor = self.collect_page(response.results, &mut out);
            debug!(page, total_pages = response.total_pages, collected = out.len(), "TMDb discover page");

            if reached_floor || response.page >= response.total_pages || page >= MAX_DISCOVER_PAGES {
                break;
            }
            page += 1;
        }

        Ok(out)
    }

    /// Append accepted movies; returns `true` once the popularity floor is reached.
    fn collect_page(&self, items: Vec<DiscoverItem>, out: &mut Vec<TmdbMovie>) -> bool {
        for item in items {
            if item.release_date.is_empty()
                || item.adult
                || self.excluded_languages.contains(&item.original_language)
            {
                continue;
            }
            if item.popularity < self.min_popularity {
                return true;
            }
            let Ok(release_date) = NaiveDate::parse_from_str(&item.release_date, "%Y-%m-%d") else {
                warn!(id = item.id, date = %item.release_date, "Skipping movie with unparseable release date");
                continue;
            };
            out.push(TmdbMovie {
                id: item.id,
                title: item.title,
                release_date,
                overview: Some(item.overview).filter(|s| !s.is_empty()),
                poster_path: item.poster_path.filter(|s| !s.is_empty()),
                backdrop_path: item.backdrop_path.filter(|s| !s.is_empty()),
                popularity: item.popularity,
            });
        }
        false
    }

    /// Fetch external ids for a movie.
    pub async fn external_ids(&self, movie_id: i64) -> AppResult<TmdbExternalIds> {
        let url = self.url(&format!("/movie/{movie_id}/external_ids"))?;
        self.get_json(url).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> TmdbClient {
        let config = CatalogConfig {
            api_key: Some("key".to_string()),
            ..CatalogConfig::default()
        };
        TmdbClient::from_config(&config).unwrap().unwrap()
    }

    fn item(id: i64, popularity: f64) -> DiscoverItem {
        DiscoverItem {
            id,
            title: format!("Movie {id}"),
            release_date: "2025-03-07".to_string(),
            overview: String::new(),
            poster_path: Some("/p.jpg".to_string()),
            backdrop_path: None,
            popularity,
            original_language: "en".to_string(),
            adult: false,
        }
    }

    #[test]
    fn test_no_api_key_disables_client() {
        assert!(TmdbClient::from_config(&CatalogConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_collect_page_filters() {
        let client = client();
        let mut adult = item(2, 50.0);
        adult.adult = true;
        let mut excluded = item(3, 40.0);
        excluded.original_language = "hi".to_string();
        let mut undated = item(4, 30.0);
        undated.release_date = String::new();

        let mut out = Vec::new();
        let done = client.collect_page(vec![item(1, 80.0), adult, excluded, undated], &mut out);

        assert!(!done);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 1);
        assert_eq!(out[0].overview, None);
        assert_eq!(out[0].release_date, NaiveDate::from_ymd_opt(2025, 3, 7).unwrap());
    }

    #[test]
    fn test_collect_page_stops_at_popularity_floor() {
        let client = client();
        let mut out = Vec::new();
        let done = client.collect_page(vec![item(1, 10.0), item(2, 2.5), item(3, 9.0)], &mut out);
        assert!(done);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_url_carries_api_key() {
        let url = client().url("/movie/5/external_ids").unwrap();
        assert_eq!(url.path(), "/3/movie/5/external_ids");
        assert!(url.query().unwrap().contains("api_key=key"));
    }
}
