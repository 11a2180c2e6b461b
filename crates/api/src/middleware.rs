//! API middleware.

#![allow(missing_docs)]

use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use cinekami_core::{CacheInvalidator, PageQueryEngine, VoteLedger};
use tracing::Instrument;

/// Header carrying the request correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub pages: PageQueryEngine,
    pub ledger: VoteLedger,
    pub invalidator: CacheInvalidator,
    pub service_name: String,
    pub started_at: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(pages: PageQueryEngine, ledger: VoteLedger, invalidator: CacheInvalidator) -> Self {
        Self {
            pages,
            ledger,
            invalidator,
            service_name: "cinekami".to_string(),
            started_at: Instant::now(),
        }
    }
}

/// Correlation id of the current request.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

/// Propagate or mint `X-Correlation-Id` and echo it on the response.
pub async fn correlation_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let id = req
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);

    req.extensions_mut().insert(CorrelationId(id.clone()));
    let span = tracing::info_span!("request", correlation_id = %id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CORRELATION_ID_HEADER), value);
    }
    response
}
