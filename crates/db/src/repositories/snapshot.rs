//! Snapshot repository.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use cinekami_common::{AppError, AppResult};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait, QueryResult, Set, Statement,
};
use tracing::warn;

use super::{Binds, keyset_predicate};
use crate::entities::{Snapshot, snapshot};
use crate::models::{
    PopularityBounds, SnapshotListItem, SnapshotRecord, SnapshotScan, SortDir, SortField,
    TallyMap, YearMonth,
};

fn snapshot_key_expr(sort: SortField) -> String {
    match sort {
        SortField::Popularity => "m.popularity".to_string(),
        SortField::ReleaseDate => "EXTRACT(EPOCH FROM m.release_date)::float8".to_string(),
        SortField::Category(c) => format!("COALESCE((s.tallies->>'{}')::float8, 0)", c.as_str()),
        SortField::MovieId => "s.movie_id::float8".to_string(),
    }
}

/// Build the snapshot page query.
pub(crate) fn snapshots_statement(month: YearMonth, scan: &SnapshotScan) -> Statement {
    let mut binds = Binds::default();
    let key_expr = snapshot_key_expr(scan.sort);

    let month_key = binds.push(month.to_string());
    let min = binds.push(scan.bounds.min);
    let max = binds.push(scan.bounds.max);
    let mut where_clause = format!(
        "s.month = {month_key}
         AND m.popularity >= {min}::float8 AND m.popularity <= {max}::float8"
    );

    if let Some(after) = &scan.after {
        let predicate = if scan.sort == SortField::MovieId {
            let op = match scan.dir {
                SortDir::Asc => ">",
                SortDir::Desc => "<",
            };
            format!("s.movie_id {op} {}", binds.push(after.id))
        } else {
            keyset_predicate(&key_expr, "s.movie_id", scan.dir, after, &mut binds)
        };
        where_clause.push_str(&format!(" AND {predicate}"));
    }

    let dir = scan.dir.as_str().to_uppercase();
    let limit = scan.limit;
    let sql = format!(
        "SELECT s.month, s.movie_id, s.tallies, s.closed_at,
            m.title, m.release_date, m.overview, m.poster_path, m.backdrop_path, m.popularity,
            {key_expr} AS key_value
        FROM snapshot s
        JOIN movie m ON m.id = s.movie_id
        WHERE {where_clause}
        ORDER BY key_value {dir}, s.movie_id {dir}
        LIMIT {limit}"
    );

    Statement::from_sql_and_values(DatabaseBackend::Postgres, &sql, binds.into_values())
}

fn decode_tallies(value: serde_json::Value) -> AppResult<TallyMap> {
    serde_json::from_value(value)
        .map_err(|e| AppError::StorageUnavailable(format!("corrupt snapshot tallies: {e}")))
}

fn decode_list_item(row: &QueryResult) -> AppResult<SnapshotListItem> {
    let get_err = |e: sea_orm::DbErr| AppError::StorageUnavailable(e.to_string());
    let closed_at: DateTime<Utc> = row
        .try_get::<DateTime<Utc>>("", "closed_at")
        .map_err(get_err)?;

    Ok(SnapshotListItem {
        snapshot: SnapshotRecord {
            month: row.try_get("", "month").map_err(get_err)?,
            movie_id: row.try_get("", "movie_id").map_err(get_err)?,
            tallies: decode_tallies(row.try_get("", "tallies").map_err(get_err)?)?,
            closed_at,
        },
        title: row.try_get("", "title").map_err(get_err)?,
        release_date: row.try_get::<NaiveDate>("", "release_date").map_err(get_err)?,
        overview: row.try_get("", "overview").map_err(get_err)?,
        poster_path: row.try_get("", "poster_path").map_err(get_err)?,
        backdrop_path: row.try_get("", "backdrop_path").map_err(get_err)?,
        popularity: row.try_get("", "popularity").map_err(get_err)?,
        sort_key: row.try_get("", "key_value").map_err(get_err)?,
    })
}

/// Snapshot repository for database operations.
#[derive(Clone)]
pub struct SnapshotRepository {
    db: Arc<DatabaseConnection>,
}

impl SnapshotRepository {
    /// Create a new snapshot repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Write or overwrite a snapshot row.
    pub async fn upsert(
        &self,
        month: YearMonth,
        movie_id: i64,
        tallies: &TallyMap,
        closed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let tallies = serde_json::to_value(tallies)
            .map_err(|e| AppError::Internal(format!("Failed to encode tallies: {e}")))?;
        let model = snapshot::ActiveModel {
            month: Set(month.to_string()),
            movie_id: Set(movie_id),
            tallies: Set(tallies),
            closed_at: Set(closed_at.into()),
        };

        Snapshot::insert(model)
            .on_conflict(
                OnConflict::columns([snapshot::Column::Month, snapshot::Column::MovieId])
                    .update_columns([snapshot::Column::Tallies, snapshot::Column::ClosedAt])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Find a snapshot by month and movie.
    pub async fn find(&self, month: YearMonth, movie_id: i64) -> AppResult<Option<SnapshotRecord>> {
        let model = Snapshot::find_by_id((month.to_string(), movie_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;

        model
            .map(|m| {
                Ok(SnapshotRecord {
                    month: m.month,
                    movie_id: m.movie_id,
                    tallies: decode_tallies(m.tallies)?,
                    closed_at: m.closed_at.with_timezone(&Utc),
                })
            })
            .transpose()
    }

    /// One page of a month's snapshots joined with movie metadata.
    pub async fn list(
        &self,
        month: YearMonth,
        scan: &SnapshotScan,
    ) -> AppResult<Vec<SnapshotListItem>> {
        let rows = self
            .db
            .query_all(snapshots_statement(month, scan))
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;

        rows.iter().map(decode_list_item).collect()
    }

    /// Count a month's snapshots within popularity bounds.
    pub async fn count(&self, month: YearMonth, bounds: PopularityBounds) -> AppResult<u64> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                "SELECT COUNT(*)::bigint AS total FROM snapshot s
                 JOIN movie m ON m.id = s.movie_id
                 WHERE s.month = $1
                   AND m.popularity >= $2::float8 AND m.popularity <= $3::float8",
                [month.to_string().into(), bounds.min.into(), bounds.max.into()],
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

    /// Archived months, newest first.
    pub async fn available_months(&self) -> AppResult<Vec<YearMonth>> {
        let rows = self
            .db
            .query_all(Statement::from_string(
                DatabaseBackend::Postgres,
                "SELECT DISTINCT month FROM snapshot ORDER BY month DESC",
            ))
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;

        let mut months = Vec::with_capacity(rows.len());
        for row in rows {
            let key = row
                .try_get::<String>("", "month")
                .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;
            match key.trim().parse::<YearMonth>() {
                Ok(month) => months.push(month),
                Err(_) => warn!(month = %key, "Skipping malformed snapshot month"),
            }
        }
        Ok(months)
    }
}
