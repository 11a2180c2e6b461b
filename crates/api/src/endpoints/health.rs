//! Health endpoint.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::middleware::AppState;

/// Liveness response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub uptime_seconds: u64,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.service_name.clone(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
