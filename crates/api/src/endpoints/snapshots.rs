//! Snapshot endpoints.

use axum::{
    Router,
    extract::{Path, Query, State},
    routing::get,
};
use cinekami_common::{AppError, AppResult};
use cinekami_core::PageParams;
use cinekami_db::YearMonth;

use crate::{middleware::AppState, response::RawJson};

/// Months with archived snapshots.
async fn available(State(state): State<AppState>) -> AppResult<RawJson> {
    Ok(RawJson(state.pages.available_snapshot_months().await?))
}

/// Archived snapshots of one month.
async fn by_month(
    State(state): State<AppState>,
    Path((year, month)): Path<(String, String)>,
    Query(params): Query<PageParams>,
) -> AppResult<RawJson> {
    let invalid = || AppError::BadRequest("invalid year/month".to_string());
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let month = YearMonth::new(year, month).map_err(|_| invalid())?;

    let req = params.for_snapshots()?;
    Ok(RawJson(state.pages.snapshots(month, &req).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/available", get(available))
        .route("/{year}/{month}", get(by_month))
}
