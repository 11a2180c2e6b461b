//! Movie repository.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use cinekami_common::{AppError, AppResult};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QueryResult, QuerySelect, Set, Statement,
};

use super::{Binds, keyset_predicate};
use crate::entities::{Movie as MovieEntity, movie};
use crate::models::{
    CatalogMovie, Movie, MovieListItem, MovieScan, PopularityBounds, SortField, TallyMap,
    YearMonth,
};

/// SQL expression of a movie sort key, valid inside [`ACTIVE_FROM`].
fn movie_key_expr(sort: SortField) -> &'static str {
    match sort {
        SortField::Popularity => "m.popularity",
        SortField::ReleaseDate => "EXTRACT(EPOCH FROM m.release_date)::float8",
        SortField::Category(c) => match c {
            crate::VoteCategory::SoloFriends => "t.solo_friends::float8",
            crate::VoteCategory::Couple => "t.couple::float8",
            crate::VoteCategory::Streaming => "t.streaming::float8",
            crate::VoteCategory::Arr => "t.arr::float8",
        },
        SortField::MovieId => "m.id::float8",
    }
}

const ACTIVE_FROM: &str = "
    FROM movie m
    CROSS JOIN LATERAL (
        SELECT
            COALESCE(SUM(count) FILTER (WHERE category = 'solo_friends'), 0)::bigint AS solo_friends,
            COALESCE(SUM(count) FILTER (WHERE category = 'couple'), 0)::bigint AS couple,
            COALESCE(SUM(count) FILTER (WHERE category = 'streaming'), 0)::bigint AS streaming,
            COALESCE(SUM(count) FILTER (WHERE category = 'arr'), 0)::bigint AS arr
        FROM tally
        WHERE movie_id = m.id
    ) t";

/// Build the active-listing page query.
pub(crate) fn active_movies_statement(month: YearMonth, scan: &MovieScan) -> Statement {
    let mut binds = Binds::default();
    let key_expr = movie_key_expr(scan.sort);

    let (voted_select, voted_join) = match &scan.fingerprint {
        Some(fp) => {
            let fp = binds.push(fp.clone());
            (
                "vc.category AS voted_category",
                format!(
                    "LEFT JOIN LATERAL (
                        SELECT v.category FROM vote v
                        JOIN voter r ON r.id = v.voter_id
                        WHERE v.movie_id = m.id AND r.fingerprint = {fp}
                        LIMIT 1
                    ) vc ON TRUE"
                ),
            )
        }
        None => ("NULL::varchar AS voted_category", String::new()),
    };

    let start = binds.push(month.first_day());
    let end = binds.push(month.last_day());
    let min = binds.push(scan.bounds.min);
    let max = binds.push(scan.bounds.max);

    let mut where_clause = format!(
        "m.release_date >= {start} AND m.release_date <= {end}
         AND m.popularity >= {min}::float8 AND m.popularity <= {max}::float8"
    );
    if let Some(after) = &scan.after {
        let predicate = keyset_predicate(key_expr, "m.id", scan.dir, after, &mut binds);
        where_clause.push_str(&format!(" AND {predicate}"));
    }

    let dir = scan.dir.as_str().to_uppercase();
    let limit = scan.limit;
    let sql = format!(
        "SELECT m.id, m.title, m.release_date, m.overview, m.poster_path, m.backdrop_path,
            m.popularity, m.imdb_url, m.cinemagia_url,
            t.solo_friends, t.couple, t.streaming, t.arr,
            {voted_select},
            {key_expr} AS key_value
        {ACTIVE_FROM}
        {voted_join}
        WHERE {where_clause}
        ORDER BY key_value {dir}, m.id {dir}
        LIMIT {limit}"
    );

    Statement::from_sql_and_values(DatabaseBackend::Postgres, &sql, binds.into_values())
}

fn decode_list_item(row: &QueryResult) -> Result<MovieListItem, sea_orm::DbErr> {
    let tallies = TallyMap::from_counts([
        ("solo_friends", row.try_get::<i64>("", "solo_friends")?),
        ("couple", row.try_get::<i64>("", "couple")?),
        ("streaming", row.try_get::<i64>("", "streaming")?),
        ("arr", row.try_get::<i64>("", "arr")?),
    ]);
    let voted_category = row
        .try_get::<Option<String>>("", "voted_category")?
        .and_then(|c| c.parse().ok());

    Ok(MovieListItem {
        movie: Movie {
            id: row.try_get("", "id")?,
            title: row.try_get("", "title")?,
            release_date: row.try_get::<NaiveDate>("", "release_date")?,
            overview: row.try_get("", "overview")?,
            poster_path: row.try_get("", "poster_path")?,
            backdrop_path: row.try_get("", "backdrop_path")?,
            popularity: row.try_get("", "popularity")?,
            imdb_url: row.try_get("", "imdb_url")?,
            cinemagia_url: row.try_get("", "cinemagia_url")?,
        },
        tallies,
        voted_category,
        sort_key: row.try_get("", "key_value")?,
    })
}

/// Movie repository for database operations.
#[derive(Clone)]
pub struct MovieRepository {
    db: Arc<DatabaseConnection>,
}

impl MovieRepository {
    /// Create a new movie repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// One page of the active listing with tallies joined.
    pub async fn list_active(
        &self,
        month: YearMonth,
        scan: &MovieScan,
    ) -> AppResult<Vec<MovieListItem>> {
        let rows = self
            .db
            .query_all(active_movies_statement(month, scan))
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;

        rows.iter()
            .map(decode_list_item)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))
    }

    /// Count movies released in a month within popularity bounds.
    pub async fn count_active(&self, month: YearMonth, bounds: PopularityBounds) -> AppResult<u64> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                "SELECT COUNT(*)::bigint AS total FROM movie
                 WHERE release_date >= $1 AND release_date <= $2
                   AND popularity >= $3::float8 AND popularity <= $4::float8",
                [
                    month.first_day().into(),
                    month.last_day().into(),
                    bounds.min.into(),
                    bounds.max.into(),
                ],
            ))
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;

        let total = match row {
            Some(row) => row
                .try_get::<i64>("", "total")
                .map_err(|e| AppError::StorageUnavailable(e.to_string()))?,
            None => 0,
        };
        Ok(total.max(0) as u64)
    }

    /// Find a movie by ID.
    pub async fn find_by_id(&self, id: i64) -> AppResult<Option<Movie>> {
        MovieEntity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map(|m| m.map(Movie::from))
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))
    }

    /// Whether the catalog holds any movie.
    pub async fn has_any(&self) -> AppResult<bool> {
        let first = MovieEntity::find()
            .select_only()
            .column(movie::Column::Id)
            .limit(1)
            .into_tuple::<i64>()
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;
        Ok(first.is_some())
    }

    /// Insert a movie or refresh every catalog column.
    pub async fn upsert(&self, m: &CatalogMovie) -> AppResult<()> {
        let now = Utc::now();
        let model = movie::ActiveModel {
            id: Set(m.id),
            title: Set(m.title.clone()),
            release_date: Set(m.release_date),
            overview: Set(m.overview.clone()),
            poster_path: Set(m.poster_path.clone()),
            backdrop_path: Set(m.backdrop_path.clone()),
            popularity: Set(m.popularity),
            imdb_url: Set(m.imdb_url.clone()),
            cinemagia_url: Set(m.cinemagia_url.clone()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        MovieEntity::insert(model)
            .on_conflict(
                OnConflict::column(movie::Column::Id)
                    .update_columns([
                        movie::Column::Title,
                        movie::Column::ReleaseDate,
                        movie::Column::Overview,
                        movie::Column::PosterPath,
                        movie::Column::BackdropPath,
                        movie::Column::Popularity,
                        movie::Column::ImdbUrl,
                        movie::Column::CinemagiaUrl,
                        movie::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }

    /// IDs of movies released in a month.
    pub async fn ids_released_in(&self, month: YearMonth) -> AppResult<Vec<i64>> {
        MovieEntity::find()
            .select_only()
            .column(movie::Column::Id)
            .filter(movie::Column::ReleaseDate.between(month.first_day(), month.last_day()))
            .order_by_asc(movie::Column::Id)
            .into_tuple::<i64>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))
    }
}
