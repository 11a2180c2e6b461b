//! Movie endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    routing::{get, post},
};
use chrono::Utc;
use cinekami_common::{AppError, AppResult};
use cinekami_core::PageParams;
use cinekami_core::page::parse_limit;
use cinekami_db::{TallyMap, VoteCategory};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{extractors::Fingerprint, middleware::AppState, response::RawJson};

// ==================== Request/Response Types ====================

/// Tally listing query.
#[derive(Debug, Default, Deserialize)]
pub struct TallyQuery {
    pub cursor: Option<String>,
    pub limit: Option<String>,
}

/// Vote request body.
#[derive(Debug, Deserialize, Validate)]
pub struct VoteRequest {
    #[validate(length(max = 32))]
    pub category: String,
    /// Used when no `X-Fingerprint` header is sent.
    #[serde(default)]
    #[validate(length(max = 256))]
    pub fingerprint: Option<String>,
}

/// Vote response.
#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub inserted: bool,
    pub message: &'static str,
    pub tallies: TallyMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voted_category: Option<VoteCategory>,
}

// ==================== Handlers ====================

/// Movies released this month.
async fn active(
    State(state): State<AppState>,
    fingerprint: Fingerprint,
    Query(params): Query<PageParams>,
) -> AppResult<RawJson> {
    let req = params.for_movies()?;
    let body = state
        .pages
        .active_movies(Utc::now(), &req, fingerprint.as_deref())
        .await?;
    Ok(RawJson(body))
}

/// Ranked tallies of a movie.
async fn tallies(
    State(state): State<AppState>,
    Path(movie_id): Path<i64>,
    fingerprint: Fingerprint,
    Query(query): Query<TallyQuery>,
) -> AppResult<RawJson> {
    let limit = parse_limit(query.limit.as_ref())?;
    let body = state
        .pages
        .movie_tallies(
            movie_id,
            query.cursor.as_deref(),
            limit,
            fingerprint.as_deref(),
        )
        .await?;
    Ok(RawJson(body))
}

/// Cast a vote.
async fn vote(
    State(state): State<AppState>,
    Path(movie_id): Path<i64>,
    fingerprint: Fingerprint,
    body: Result<Json<VoteRequest>, JsonRejection>,
) -> AppResult<Json<VoteResponse>> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    body.validate()?;
    let fingerprint = fingerprint
        .0
        .or_else(|| body.fingerprint.filter(|fp| !fp.trim().is_empty()))
        .ok_or_else(|| AppError::BadRequest("fingerprint is required".to_string()))?;

    let now = Utc::now();
    let outcome = state
        .ledger
        .cast_vote(movie_id, &body.category, &fingerprint, now)
        .await?;
    if outcome.inserted {
        state.invalidator.invalidate_vote(movie_id, now).await;
    }

    Ok(Json(VoteResponse {
        inserted: outcome.inserted,
        message: if outcome.inserted {
            "vote recorded"
        } else {
            "duplicate ignored"
        },
        tallies: outcome.tallies,
        voted_category: outcome.voted_category,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/active", get(active))
        .route("/{id}/tallies", get(tallies))
        .route("/{id}/votes", post(vote))
}
