//! API endpoints.

mod health;
mod movies;
mod snapshots;

use axum::{
    Router,
    http::{HeaderValue, Uri},
    middleware,
};
use cinekami_common::AppError;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::middleware::{AppState, correlation_id_middleware};

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/movies", movies::router())
        .nest("/snapshots", snapshots::router())
        .fallback(not_found)
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("no route for {}", uri.path()))
}

fn cors(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// The full application: routes, tracing, CORS and correlation ids.
pub fn app(state: AppState, allowed_origins: &[String]) -> Router {
    router()
        .layer(TraceLayer::new_for_http())
        .layer(cors(allowed_origins))
        .layer(middleware::from_fn(correlation_id_middleware))
        .with_state(state)
}
