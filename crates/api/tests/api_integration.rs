//! API integration tests.
//!
//! These tests drive the full router over in-memory storage and cache.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use cinekami_api::{AppState, app};
use cinekami_common::{CursorCodec, InMemoryCache};
use cinekami_core::{CacheInvalidator, PageQueryEngine, VoteLedger};
use cinekami_db::test_utils::catalog_movie;
use cinekami_db::{MemoryStorage, MovieStore, SnapshotStore, TallyMap, YearMonth};
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    storage: MemoryStorage,
}

/// Create the app over empty in-memory backends.
fn create_test_app() -> TestApp {
    let storage = MemoryStorage::new();
    let cache = Arc::new(InMemoryCache::new());
    let invalidator = CacheInvalidator::new(cache.clone());
    let pages = PageQueryEngine::new(
        Arc::new(storage.clone()),
        cache,
        CursorCodec::new(b"api-test-secret"),
    );
    let ledger = VoteLedger::new(Arc::new(storage.clone()));

    TestApp {
        router: app(AppState::new(pages, ledger, invalidator), &[]),
        storage,
    }
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn vote(movie_id: i64, fingerprint: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/movies/{movie_id}/votes"))
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Fingerprint", fingerprint)
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app();
    let response = app.router.clone().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-correlation-id"));

    let (_, body) = send(&app.router, get("/health")).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "cinekami");
}

#[tokio::test]
async fn test_unknown_route_is_json_not_found() {
    let app = create_test_app();
    let (status, body) = send(&app.router, get("/movies/42/reviews")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_correlation_id_is_echoed() {
    let app = create_test_app();
    let req = Request::builder()
        .uri("/health")
        .header("X-Correlation-Id", "abc-123")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.headers()["x-correlation-id"], "abc-123");
}

#[tokio::test]
async fn test_vote_flow() {
    let app = create_test_app();
    let today = Utc::now().date_naive();
    app.storage
        .upsert_movie(&catalog_movie(42, today, 10.0))
        .await
        .unwrap();

    let (status, body) = send(&app.router, vote(42, "fp-A", json!({"category": "couple"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inserted"], true);
    assert_eq!(body["message"], "vote recorded");
    assert_eq!(
        body["tallies"],
        json!({"arr": 0, "couple": 1, "solo_friends": 0, "streaming": 0})
    );

    let (_, body) = send(&app.router, vote(42, "fp-A", json!({"category": "arr"}))).await;
    assert_eq!(body["inserted"], false);
    assert_eq!(body["message"], "duplicate ignored");
    assert_eq!(body["voted_category"], "couple");

    let (status, body) = send(&app.router, get("/movies/42/tallies?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 4);
    assert_eq!(body["items"][0]["category"], "couple");
    assert_eq!(body["items"][0]["count"], 1);
    assert!(body["next_cursor"].is_string());
}

#[tokio::test]
async fn test_vote_invalidates_active_listing() {
    let app = create_test_app();
    let today = Utc::now().date_naive();
    app.storage
        .upsert_movie(&catalog_movie(7, today, 3.0))
        .await
        .unwrap();

    let (_, before) = send(&app.router, get("/movies/active")).await;
    assert_eq!(before["items"][0]["tallies"]["streaming"], 0);

    send(&app.router, vote(7, "fp-A", json!({"category": "streaming"}))).await;

    let (_, after) = send(&app.router, get("/movies/active")).await;
    assert_eq!(after["items"][0]["tallies"]["streaming"], 1);
    assert_eq!(after["total"], 1);
}

#[tokio::test]
async fn test_vote_errors() {
    let app = create_test_app();
    let old = Utc::now().date_naive() - Duration::days(30);
    app.storage
        .upsert_movie(&catalog_movie(1, old, 1.0))
        .await
        .unwrap();
    app.storage
        .upsert_movie(&catalog_movie(2, Utc::now().date_naive(), 1.0))
        .await
        .unwrap();

    let (status, body) = send(&app.router, vote(99, "fp", json!({"category": "couple"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "MOVIE_NOT_FOUND");

    let (status, body) = send(&app.router, vote(1, "fp", json!({"category": "couple"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "VOTING_CLOSED");

    let (status, body) = send(&app.router, vote(2, "fp", json!({"category": "popcorn"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_CATEGORY");

    let req = Request::builder()
        .method("POST")
        .uri("/movies/2/votes")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"category": "couple"}).to_string()))
        .unwrap();
    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_fingerprint_from_body() {
    let app = create_test_app();
    app.storage
        .upsert_movie(&catalog_movie(3, Utc::now().date_naive(), 1.0))
        .await
        .unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/movies/3/votes")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"category": "solo_friends", "fingerprint": "fp-body"}).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inserted"], true);
    assert_eq!(body["voted_category"], "solo_friends");
}

#[tokio::test]
async fn test_listing_validation() {
    let app = create_test_app();

    let (status, body) = send(
        &app.router,
        get("/movies/active?min_popularity=10&max_popularity=1"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_FILTER");

    let (status, body) = send(&app.router, get("/movies/active?cursor=not-a-cursor")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_CURSOR");

    let (status, _) = send(&app.router, get("/movies/active?limit=500")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_snapshot_endpoints() {
    let app = create_test_app();
    let march = YearMonth::new(2025, 3).unwrap();
    let release = march.first_day();
    app.storage
        .upsert_movie(&catalog_movie(42, release, 12.0))
        .await
        .unwrap();
    let mut tallies = TallyMap::zero();
    tallies.increment(cinekami_db::VoteCategory::Couple);
    app.storage
        .upsert_snapshot(march, 42, &tallies, Utc::now())
        .await
        .unwrap();

    let (status, body) = send(&app.router, get("/snapshots/available")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"], json!([{"year": 2025, "month": 3}]));

    let (status, body) = send(&app.router, get("/snapshots/2025/3?sort_by=movie_id")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["items"][0]["movie_id"], 42);
    assert_eq!(body["items"][0]["month"], "2025-03");
    assert_eq!(body["items"][0]["tallies"]["couple"], 1);
    assert!(body.get("next_cursor").is_none());

    let (status, _) = send(&app.router, get("/snapshots/2025/13")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_fingerprint_is_rejected() {
    let app = create_test_app();
    let req = Request::builder()
        .method("POST")
        .uri("/movies/3/votes")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"category": "couple", "fingerprint": "f".repeat(300)}).to_string(),
        ))
        .unwrap();

    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
